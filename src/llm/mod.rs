pub mod gemini;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Why a completion could not be used. Every variant leads to the same fallback,
/// the distinction only feeds logging.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("quota exhausted: {0}")]
    Quota(String),

    #[error("HTTP failure: {0}")]
    Http(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl LlmError {
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::Timeout(_) => "timeout",
            LlmError::Auth(_) => "auth",
            LlmError::Quota(_) => "quota",
            LlmError::Http(_) => "http",
            LlmError::Malformed(_) => "malformed",
        }
    }
}

/// Text completion collaborator.
#[async_trait]
pub trait Complete: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, LlmError>;
}
