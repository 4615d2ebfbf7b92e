//! Crate-wide error type.

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local store failure
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Encryption or decryption of a stored column failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Feature source could not be parsed at all (individual bad cells are defaulted, not errors)
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Parse(err.to_string())
    }
}
