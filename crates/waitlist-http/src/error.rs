//! Error types for the count stream client.

use thiserror::Error;

/// Result type for count stream operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that end one connection attempt of the count client.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected status {0} from count stream")]
    Status(u16),

    #[error("Count stream closed")]
    Closed,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err.to_string())
    }
}
