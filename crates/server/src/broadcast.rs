//! Best-effort fan-out of count updates
//!
//! A push that fails prunes that one connection; nothing propagates to the
//! other connections or to the caller.

use crate::registry::ConnectionRegistry;
use crate::store::CountStore;
use std::sync::Arc;
use tracing::{debug, info, warn};
use waitlist_http::protocol::encode_count;

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: usize,
}

#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn broadcast(&self, count: u64) -> BroadcastReport {
        let frame = encode_count(count);
        let mut report = BroadcastReport::default();

        self.registry.for_each(|connection| match connection.push(frame.clone()) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                debug!("[Broadcast] Pruning {}: {:?}", connection.id(), e);
                self.registry.disconnect(connection);
                report.pruned += 1;
            }
        });

        debug!(
            "[Broadcast] count={} delivered={} pruned={}",
            count, report.delivered, report.pruned
        );
        report
    }

    /// Re-read the store and push the fresh count to everyone.
    ///
    /// Used after writes so clients need not wait for their next poll.
    pub async fn notify_count_update(&self, counts: &CountStore) -> Option<(u64, BroadcastReport)> {
        match counts.fetch_count().await {
            Ok(count) => {
                let report = self.broadcast(count);
                info!(
                    "[Broadcast] Pushed count {} to {} connections",
                    count, report.delivered
                );
                Some((count, report))
            }
            Err(e) => {
                warn!("[Broadcast] Failed to refresh count: {}", e);
                None
            }
        }
    }
}
