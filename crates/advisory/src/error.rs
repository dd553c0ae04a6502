// In crates/advisory/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to build the advisory client: {0}")]
    ClientBuildError(String),
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(#[from] serde_json::Error),
    #[error("Advisory service error: status {status}, msg: {msg}")]
    ServiceError { status: u16, msg: String },
    #[error("Invalid recommendation: {0}")]
    InvalidRecommendation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
