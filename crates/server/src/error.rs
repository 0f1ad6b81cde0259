use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration
    #[error("{0}")]
    Configuration(String),

    // Store errors
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Store rejected credentials: {0}")]
    StoreAuth(String),
    #[error("Unexpected store response: {0}")]
    StoreFormat(String),

    // Request errors
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Configuration(_)
            | Error::StoreUnavailable(_)
            | Error::StoreAuth(_)
            | Error::StoreFormat(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    /// Auth failures are not distinguished from outages by this service.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_) | Error::StoreAuth(_) | Error::StoreFormat(_)
        )
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Error::Configuration(details) => json!({
                "error": "Server configuration error",
                "details": details,
            }),
            Error::StoreUnavailable(_) | Error::StoreAuth(_) | Error::StoreFormat(_) => json!({
                "error": "Store request failed",
                "details": self.to_string(),
            }),
            Error::Validation(message) | Error::NotFound(message) => json!({ "error": message }),
            Error::Unauthorized => json!({ "error": "Unauthorized" }),
            Error::Internal(details) => json!({
                "error": "Internal server error",
                "details": details,
            }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::StoreFormat(err.to_string())
        } else {
            Error::StoreUnavailable(err.to_string())
        }
    }
}
