use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ScribeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("model file not found at {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("inference engine is not available: {0}")]
    EngineUnavailable(String),
    #[error("inference request failed: {0}")]
    EngineRequest(#[from] reqwest::Error),
    #[error("inference engine returned an unexpected response: {0}")]
    EngineResponse(String),
    #[error("a report is already being generated")]
    GenerationInProgress,
    #[error("operation cancelled because the session is shutting down")]
    Cancelled,

    #[error("invalid report: {0}")]
    InvalidReport(String),
    #[error("failed to serialize report: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize report: {0}")]
    Deserialization(serde_json::Error),

    #[error("history database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("history store lock poisoned")]
    StoreLockPoisoned,
    #[error("history row {0} not found")]
    HistoryNotFound(i64),

    #[error("failed to render PDF: {0}")]
    Pdf(String),
    #[error("failed to create export directory: {0}")]
    ExportDirCreation(std::io::Error),
    #[error("failed to write file: {0}")]
    FileWrite(std::io::Error),

    #[error("background task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub type ScribeResult<T> = std::result::Result<T, ScribeError>;
