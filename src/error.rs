//! Error types for Chatterbox

use thiserror::Error;

/// Result type alias for Chatterbox operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Chatterbox
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Usage ledger error: {0}")]
    Ledger(String),

    /// A call succeeded but the provider reported no usage at all.
    #[error("No usage information reported by {tool}")]
    UsageSignalMissing { tool: String },

    #[error("Reached the limit of {0} iterations without a final answer")]
    MaxIterations(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
