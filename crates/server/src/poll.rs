//! Per-connection refresh loop
//!
//! ```text
//! Active --tick--> Refreshing --ok--> Active
//!                      |
//!                      +--err--> Terminating (close + unregister, final)
//! ```
//!
//! The loop sleeps, then refreshes, so a tick never starts while the
//! previous read is still in flight.

use crate::registry::{Connection, ConnectionRegistry};
use crate::store::CountStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use waitlist_http::protocol::encode_count;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Active,
    Refreshing,
    Terminating,
}

pub struct PollLoop {
    connection: Arc<Connection>,
    registry: Arc<ConnectionRegistry>,
    counts: CountStore,
    interval: Duration,
    state: PollState,
}

impl PollLoop {
    pub fn new(
        connection: Arc<Connection>,
        registry: Arc<ConnectionRegistry>,
        counts: CountStore,
        interval: Duration,
    ) -> Self {
        Self {
            connection,
            registry,
            counts,
            interval,
            state: PollState::Active,
        }
    }

    /// Spawn the loop and hand its cancel handle to the connection, so the
    /// connection's teardown cancels exactly this task.
    pub fn spawn(self) -> JoinHandle<()> {
        let connection = self.connection.clone();
        let handle = tokio::spawn(self.run());
        connection.attach_poller(handle.abort_handle());
        handle
    }

    async fn run(mut self) {
        let id = self.connection.id();
        debug!("[Poll] {} started, interval {:?}", id, self.interval);

        while self.state == PollState::Active {
            tokio::time::sleep(self.interval).await;
            self.state = PollState::Refreshing;

            self.state = match self.counts.fetch_count().await {
                Ok(count) => match self.connection.push(encode_count(count)) {
                    Ok(()) => {
                        debug!("[Poll] {} pushed count {}", id, count);
                        PollState::Active
                    }
                    Err(e) => {
                        debug!("[Poll] {} push failed: {:?}", id, e);
                        PollState::Terminating
                    }
                },
                Err(e) if e.is_store_failure() => {
                    warn!("[Poll] {} refresh failed, closing: {}", id, e);
                    PollState::Terminating
                }
                Err(e) => {
                    error!("[Poll] {} cannot refresh, closing: {}", id, e);
                    PollState::Terminating
                }
            };
        }

        self.connection.detach_poller();
        self.registry.disconnect(&self.connection);
        debug!("[Poll] {} terminated", id);
    }
}
