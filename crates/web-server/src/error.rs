// In crates/web-server/src/error.rs

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid bot id: {0}")]
    InvalidId(String),

    #[error(transparent)]
    Manager(#[from] engine::Error),

    #[error("Failed to bind the server address: {0}")]
    ServerBindError(std::io::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidId(_) => StatusCode::BAD_REQUEST,
            Error::Manager(engine::Error::UnknownBot(_)) => StatusCode::NOT_FOUND,
            Error::Manager(engine::Error::InvalidConfig(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::ServerBindError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
