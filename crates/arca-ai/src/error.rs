use std::time::Duration;

use thiserror::Error;

use crate::EmbeddingConfig;

#[derive(Debug, Error)]
pub enum AiError {
    /// A second embedding configuration was requested after the process-wide
    /// embedder was initialised with a different one.
    #[error("embedding model already initialised as {active}, refusing to switch to {requested}")]
    EmbeddingConfigMismatch {
        active: EmbeddingConfig,
        requested: EmbeddingConfig,
    },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Oracle(#[from] OracleError),
}

impl From<anyhow::Error> for AiError {
    fn from(e: anyhow::Error) -> Self {
        AiError::Embedding(format!("{e:#}"))
    }
}

/// Hard failure of a text-generation call. The excerpt being classified is
/// dropped; malformed output is not an `OracleError`.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(String),

    #[error("oracle returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not decode oracle envelope: {0}")]
    Decode(String),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            OracleError::Decode(e.to_string())
        } else {
            OracleError::Transport(e.to_string())
        }
    }
}
