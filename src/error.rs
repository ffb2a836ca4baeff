//! Error type shared by the cache, the comparison consumer and snapshot persistence.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Empty sector label or unrecognized cache kind. Programmer error, surfaced loudly.
    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    /// Report comparison called with an unsupported number of reports.
    #[error("comparison error: {0}")]
    Comparison(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// True for caller mistakes (bad key, bad comparison input) as opposed to I/O failures.
    pub fn is_client_error(&self) -> bool {
        matches!(self, CoreError::InvalidKey(_) | CoreError::Comparison(_))
    }
}
