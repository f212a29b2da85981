use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("LLM API key is not configured (set GEMINI_API_KEY or SQLRAG_LLM__API_KEY)")]
    MissingApiKey,

    #[error("Corpus file not found: {}", .0.display())]
    CorpusMissing(PathBuf),

    #[error("Corpus inconsistency: {0}")]
    CorpusInconsistency(String),

    #[error("Dimension mismatch: corpus vectors have {expected} dims, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index {index} out of range for corpus of {len} chunks")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Embedding error: {0}")]
    Embed(String),

    #[error("Embedding timed out after {0:?}")]
    EmbedTimeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Index encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
