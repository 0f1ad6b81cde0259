//! Observable waitlist count fed by the event stream.
//!
//! One stream is open at a time. A malformed frame only marks the state as
//! unparsable; a connection-level failure schedules exactly one reconnection
//! after the fixed delay, forever, until the handle is shut down or dropped.

use crate::client::config::ClientConfig;
use crate::client::network::{ChunkReceiver, CountNetwork};
use crate::client::retry::{RetryDecision, RetryState};
use crate::protocol::{CountUpdate, FrameParser};
use std::fmt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Error indication shown next to the last known count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountError {
    /// A single frame could not be parsed; the connection stays open.
    ParseFailed,
    /// The stream failed or closed; a reconnect is pending.
    ConnectionLost,
}

impl CountError {
    pub fn message(&self) -> &'static str {
        match self {
            CountError::ParseFailed => "Failed to parse count update",
            CountError::ConnectionLost => "Connection lost. Retrying...",
        }
    }
}

impl fmt::Display for CountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountState {
    /// Last known good count, `None` until the first frame arrives.
    pub count: Option<u64>,
    pub error: Option<CountError>,
}

pub struct CountClient<N> {
    network: N,
    config: ClientConfig,
    state: watch::Sender<CountState>,
}

impl<N: CountNetwork> CountClient<N> {
    /// Start streaming in the background.
    pub fn spawn(network: N, config: ClientConfig) -> CountClientHandle {
        let (state, receiver) = watch::channel(CountState::default());
        let client = Self {
            network,
            config,
            state,
        };
        let task = tokio::spawn(client.run());
        CountClientHandle {
            state: receiver,
            task,
        }
    }

    async fn run(self) {
        let mut retry = RetryState::new(self.config.retry_config());

        loop {
            match self.network.open(&self.config.url).await {
                Ok(chunks) => {
                    info!("[CountClient] Connected to {}", self.config.url);
                    self.consume(chunks, &mut retry).await;
                }
                Err(e) => {
                    warn!("[CountClient] Failed to connect to {}: {}", self.config.url, e);
                }
            }

            self.state
                .send_modify(|state| state.error = Some(CountError::ConnectionLost));

            match retry.on_failure() {
                RetryDecision::Retry(delay) => {
                    debug!(
                        "[CountClient] Reconnecting in {:?} (attempt {})",
                        delay, retry.attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DontRetry => {
                    warn!("[CountClient] Giving up after {} attempts", retry.attempts);
                    break;
                }
            }
        }
    }

    async fn consume(&self, chunks: ChunkReceiver, retry: &mut RetryState) {
        let mut parser = FrameParser::new();

        while let Some(chunk) = chunks.recv().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("[CountClient] Stream error: {}", e);
                    return;
                }
            };

            for payload in parser.feed(&chunk) {
                if self.apply(&payload) {
                    retry.reset();
                }
            }
        }

        debug!("[CountClient] Stream closed");
    }

    /// Returns true when the payload carried a count.
    fn apply(&self, payload: &str) -> bool {
        match CountUpdate::from_payload(payload) {
            Ok(Some(count)) => {
                self.state.send_modify(|state| {
                    state.count = Some(count);
                    state.error = None;
                });
                true
            }
            Ok(None) => {
                debug!("[CountClient] Ignoring frame without a numeric count");
                false
            }
            Err(e) => {
                warn!("[CountClient] Failed to parse frame: {}", e);
                self.state
                    .send_modify(|state| state.error = Some(CountError::ParseFailed));
                false
            }
        }
    }
}

/// Owner of a running [`CountClient`]. Dropping it tears the client down.
pub struct CountClientHandle {
    state: watch::Receiver<CountState>,
    task: JoinHandle<()>,
}

impl CountClientHandle {
    pub fn state(&self) -> CountState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CountState> {
        self.state.clone()
    }

    /// Close the stream and cancel any pending reconnect.
    pub fn shutdown(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CountClientHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
