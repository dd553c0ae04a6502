// In crates/venue/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to build the venue client: {0}")]
    ClientBuildError(String),
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Connectivity error: {0}")]
    Connectivity(String),
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(#[from] serde_json::Error),
    #[error("Venue error: {msg}")]
    ApiError { msg: String },
    #[error("Order rejected: {reason}")]
    Rejected { reason: String },
}

impl Error {
    /// Transient errors abandon the current tick and are retried on the
    /// next one; anything else drops the candidate action instead.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RequestFailed(_) | Error::Connectivity(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
