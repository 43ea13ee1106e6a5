//! Inference engine contract.
//!
//! The model itself is hosted outside this process. The session only needs two operations: load
//! a model (which may fail because the file is missing or the host is down) and turn a prompt
//! into text.

mod llama;

pub use llama::{LlamaServerEngine, LlamaServerLoader};

use crate::constants::{
    DEFAULT_ENGINE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL_PATH, DEFAULT_RANDOM_SEED,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
};
use crate::error::ScribeResult;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Model location and sampling options.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineOptions {
    pub model_path: PathBuf,
    /// Base URL of the server hosting the model.
    pub endpoint: String,
    pub max_tokens: u32,
    pub top_k: u32,
    pub temperature: f32,
    pub random_seed: u64,
    pub request_timeout: Duration,
}

impl EngineOptions {
    pub fn new(model_path: impl Into<PathBuf>, endpoint: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            endpoint: DEFAULT_ENGINE_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            top_k: DEFAULT_TOP_K,
            temperature: DEFAULT_TEMPERATURE,
            random_seed: DEFAULT_RANDOM_SEED,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// A loaded model that can answer prompts.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    async fn generate(&self, prompt: &str) -> ScribeResult<String>;
}

/// Produces a ready engine from options.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    /// # Errors
    ///
    /// Returns `ScribeError::ModelNotFound` or `ScribeError::EngineUnavailable` when no engine
    /// can be produced.
    async fn load(&self, options: &EngineOptions) -> ScribeResult<Arc<dyn InferenceEngine>>;
}
