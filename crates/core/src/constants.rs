//! Constants used throughout the scribe core crate.
//!
//! Defaults for configuration, the fallback sentinels and the fence markers live here so the
//! binaries and tests agree on them.

/// Default location of the on-device model file.
pub const DEFAULT_MODEL_PATH: &str = "/data/local/tmp/llm/model.bin";

/// Default base URL of the llama.cpp-compatible server hosting the model.
pub const DEFAULT_ENGINE_URL: &str = "http://127.0.0.1:8080";

/// Default SQLite file for the report history.
pub const DEFAULT_DB_PATH: &str = "scribe_history.db";

/// Default directory PDF exports are written to.
pub const DEFAULT_EXPORT_DIR: &str = "exports";

/// Language reports are written in unless the caller picks another.
pub const DEFAULT_TARGET_LANGUAGE: &str = "English";

/// Billing code used when the model does not supply one.
pub const DEFAULT_BILLING_CODE: &str = "Pending";

/// Upper bound of the report risk score (inclusive).
pub const MAX_RISK_SCORE: u8 = 100;

/// Patient name of the record substituted for unparseable model output.
pub const FALLBACK_PATIENT_NAME: &str = "Parsing Error";

/// Diagnosis of the record substituted for unparseable model output.
pub const FALLBACK_DIAGNOSIS: &str = "Could not parse AI output";

/// Markdown fence markers stripped from model output, in removal order.
pub const CODE_FENCE_MARKERS: &[&str] = &["```json", "```"];

/// Sampling defaults passed to the inference engine.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TOP_K: u32 = 40;
pub const DEFAULT_TEMPERATURE: f32 = 0.8;
pub const DEFAULT_RANDOM_SEED: u64 = 101;

/// Seconds to wait for a single completion before giving up.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Filename prefix of exported PDFs; the export timestamp in milliseconds follows.
pub const PDF_FILENAME_PREFIX: &str = "MedicalReport_";
