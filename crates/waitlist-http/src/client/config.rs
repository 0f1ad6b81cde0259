//! Configuration for the count stream client.

use crate::client::retry::RetryConfig;
use std::time::Duration;

/// Configuration for the count stream client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Stream endpoint URL.
    pub url: String,
    /// Fixed delay before each reconnection attempt.
    pub reconnect_delay: Duration,
    /// Maximum reconnection attempts (None = retry while mounted).
    pub max_reconnects: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            url: "http://localhost:3001/api/waitlist/stream".to_string(),
            reconnect_delay: Duration::from_secs(5),
            max_reconnects: None,
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_reconnects,
            delay: self.reconnect_delay,
        }
    }
}
