//! # Scribe Core
//!
//! Core logic for the medical scribe: dictation in, structured report out.
//!
//! This crate contains:
//! - The [`MedicalReport`] model and its JSON wire format
//! - Prompt construction and sanitising of raw model output
//! - The [`InferenceEngine`] contract and a llama.cpp server client
//! - SQLite-backed report history
//! - Clinician edits and PDF export
//! - [`ScribeSession`], the observable state a front end binds to
//!
//! **No API concerns**: HTTP servers and command-line parsing belong in `api-rest` and `cli`.

pub mod config;
pub mod constants;
pub mod edit;
pub mod engine;
pub mod error;
pub mod history;
pub mod pdf;
pub mod prompt;
pub mod report;
pub mod sanitize;
pub mod session;

pub use config::{EnvValues, ScribeConfig};
pub use edit::{apply_edit, ReportEdit};
pub use engine::{
    EngineLoader, EngineOptions, InferenceEngine, LlamaServerEngine, LlamaServerLoader,
};
pub use error::{ScribeError, ScribeResult};
pub use history::{HistoryItem, HistoryStore};
pub use report::MedicalReport;
pub use sanitize::{parse_model_output, ParsedOutput};
pub use session::{DisplayedReport, EditOutcome, GenerationOutcome, ScribeSession};

pub use scribe_types::NonEmptyText;
