// In crates/core-types/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid bot configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown timeframe: {0}")]
    UnknownTimeframe(String),
}

pub type Result<T> = std::result::Result<T, Error>;
