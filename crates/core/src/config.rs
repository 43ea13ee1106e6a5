//! Runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the session and
//! store. Nothing in this crate reads environment variables; the binaries read them and hand the
//! raw values to the `*_from_env_value` helpers below.

use crate::constants::{
    DEFAULT_DB_PATH, DEFAULT_ENGINE_URL, DEFAULT_EXPORT_DIR, DEFAULT_MODEL_PATH,
    DEFAULT_TARGET_LANGUAGE,
};
use crate::engine::EngineOptions;
use crate::error::{ScribeError, ScribeResult};
use scribe_types::NonEmptyText;
use std::path::{Path, PathBuf};

/// Configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct ScribeConfig {
    db_path: PathBuf,
    export_dir: PathBuf,
    target_language: NonEmptyText,
    engine: EngineOptions,
}

impl ScribeConfig {
    /// Create a new `ScribeConfig`.
    ///
    /// # Errors
    ///
    /// Returns `ScribeError::InvalidInput` if the engine endpoint is not an http(s) URL.
    pub fn new(
        db_path: PathBuf,
        export_dir: PathBuf,
        target_language: NonEmptyText,
        engine: EngineOptions,
    ) -> ScribeResult<Self> {
        validate_endpoint(&engine.endpoint)?;
        Ok(Self {
            db_path,
            export_dir,
            target_language,
            engine,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn target_language(&self) -> &NonEmptyText {
        &self.target_language
    }

    pub fn engine(&self) -> &EngineOptions {
        &self.engine
    }
}

/// Raw, unvalidated values as read from the environment by a binary.
#[derive(Clone, Debug, Default)]
pub struct EnvValues {
    pub db_path: Option<String>,
    pub model_path: Option<String>,
    pub engine_url: Option<String>,
    pub export_dir: Option<String>,
    pub language: Option<String>,
}

impl ScribeConfig {
    /// Resolves a configuration from raw environment values, applying defaults.
    ///
    /// # Errors
    ///
    /// Returns `ScribeError::InvalidInput` if the engine URL is not an http(s) URL.
    pub fn from_env_values(values: EnvValues) -> ScribeResult<Self> {
        let endpoint = engine_url_from_env_value(values.engine_url)?;
        let engine = EngineOptions::new(model_path_from_env_value(values.model_path), endpoint);
        Self::new(
            db_path_from_env_value(values.db_path),
            export_dir_from_env_value(values.export_dir),
            language_from_env_value(values.language),
            engine,
        )
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Path of the history database; blank or missing values fall back to the default.
pub fn db_path_from_env_value(value: Option<String>) -> PathBuf {
    PathBuf::from(non_blank(value).unwrap_or_else(|| DEFAULT_DB_PATH.into()))
}

/// Path of the model file; blank or missing values fall back to the default.
pub fn model_path_from_env_value(value: Option<String>) -> PathBuf {
    PathBuf::from(non_blank(value).unwrap_or_else(|| DEFAULT_MODEL_PATH.into()))
}

/// Directory for PDF exports; blank or missing values fall back to the default.
pub fn export_dir_from_env_value(value: Option<String>) -> PathBuf {
    PathBuf::from(non_blank(value).unwrap_or_else(|| DEFAULT_EXPORT_DIR.into()))
}

/// Target language for generated reports; blank or missing values mean English.
pub fn language_from_env_value(value: Option<String>) -> NonEmptyText {
    non_blank(value)
        .and_then(|v| NonEmptyText::new(v).ok())
        .unwrap_or_else(default_language)
}

/// The default target language.
pub fn default_language() -> NonEmptyText {
    NonEmptyText::new(DEFAULT_TARGET_LANGUAGE).unwrap_or_else(|_| unreachable!())
}

/// Engine base URL; blank or missing values fall back to the local default.
///
/// # Errors
///
/// Returns `ScribeError::InvalidInput` if the value is not an http(s) URL.
pub fn engine_url_from_env_value(value: Option<String>) -> ScribeResult<String> {
    let url = non_blank(value).unwrap_or_else(|| DEFAULT_ENGINE_URL.into());
    validate_endpoint(&url)?;
    Ok(url.trim_end_matches('/').to_string())
}

fn validate_endpoint(url: &str) -> ScribeResult<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ScribeError::InvalidInput(format!(
            "engine endpoint must be an http(s) URL, got '{}'",
            url
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_use_defaults() {
        assert_eq!(db_path_from_env_value(None), PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(
            model_path_from_env_value(Some("   ".into())),
            PathBuf::from(DEFAULT_MODEL_PATH)
        );
        assert_eq!(export_dir_from_env_value(None), PathBuf::from("exports"));
        assert_eq!(language_from_env_value(None).as_str(), "English");
        assert_eq!(
            engine_url_from_env_value(None).unwrap(),
            "http://127.0.0.1:8080"
        );
    }

    #[test]
    fn explicit_values_are_trimmed() {
        assert_eq!(
            db_path_from_env_value(Some(" /tmp/h.db ".into())),
            PathBuf::from("/tmp/h.db")
        );
        assert_eq!(
            language_from_env_value(Some(" French ".into())).as_str(),
            "French"
        );
        assert_eq!(
            engine_url_from_env_value(Some("https://llm.local:9000/".into())).unwrap(),
            "https://llm.local:9000"
        );
    }

    #[test]
    fn resolves_full_config_from_env_values() {
        let cfg = ScribeConfig::from_env_values(EnvValues {
            db_path: Some("/var/lib/scribe/h.db".into()),
            model_path: None,
            engine_url: Some("http://gpu-box:8080/".into()),
            export_dir: Some("".into()),
            language: Some("German".into()),
        })
        .unwrap();

        assert_eq!(cfg.db_path(), Path::new("/var/lib/scribe/h.db"));
        assert_eq!(cfg.export_dir(), Path::new(DEFAULT_EXPORT_DIR));
        assert_eq!(cfg.target_language().as_str(), "German");
        assert_eq!(cfg.engine().endpoint, "http://gpu-box:8080");
        assert_eq!(cfg.engine().model_path, PathBuf::from(DEFAULT_MODEL_PATH));
    }

    #[test]
    fn rejects_non_http_endpoint() {
        assert!(matches!(
            engine_url_from_env_value(Some("ftp://model".into())),
            Err(ScribeError::InvalidInput(_))
        ));

        let engine = EngineOptions::new("/m.bin", "localhost:8080");
        let err = ScribeConfig::new(
            PathBuf::from("h.db"),
            PathBuf::from("exports"),
            default_language(),
            engine,
        )
        .unwrap_err();
        assert!(matches!(err, ScribeError::InvalidInput(_)));
    }
}
