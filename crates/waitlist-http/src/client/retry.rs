//! Reconnection policy for the count client.
//!
//! The delay is fixed: repeated failures wait the same amount every time
//! instead of compounding.

use std::time::Duration;

/// Configuration for reconnect behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (None = infinite)
    pub max_retries: Option<u32>,
    /// Delay before every attempt
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry(Duration),
    DontRetry,
}

#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempts: u32,
    config: RetryConfig,
}

impl RetryState {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            attempts: 0,
            config,
        }
    }

    /// Record a failed connection and decide whether to try again.
    pub fn on_failure(&mut self) -> RetryDecision {
        self.attempts += 1;
        if let Some(max) = self.config.max_retries {
            if self.attempts > max {
                return RetryDecision::DontRetry;
            }
        }

        RetryDecision::Retry(self.config.delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
