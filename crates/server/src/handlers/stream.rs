//! Server-push count stream
//!
//! Each request becomes one registered connection: the current count is sent
//! at once, then a per-connection poll loop keeps it fresh until the client
//! goes away or a refresh fails. A connection joins the registry only after
//! its snapshot is queued, so broadcasts always follow the snapshot.

use crate::config::AppState;
use crate::error::{Error, Result};
use crate::poll::PollLoop;
use crate::registry::{Connection, ConnectionRegistry};
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};
use waitlist_http::protocol::{encode_count, encode_keep_alive, EVENT_STREAM};

/// Frames buffered per connection before a slow reader counts as gone
const CONNECTION_BUFFER: usize = 16;

/// Tears the connection down when the response body is dropped, whether the
/// stream ended or the client disconnected mid-stream.
struct DisconnectGuard {
    connection: Arc<Connection>,
    registry: Arc<ConnectionRegistry>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.connection.is_closed() {
            info!("[Stream] {} disconnected", self.connection.id());
        }
        self.registry.disconnect(&self.connection);
    }
}

/// GET /api/waitlist/stream
pub async fn stream_count(State(state): State<AppState>) -> Result<Response> {
    if let Err(e) = state.counts.ensure_configured() {
        error!("[Stream] Refusing stream: {}", e);
        return Err(e);
    }

    let (connection, mut frames) = Connection::open(CONNECTION_BUFFER);

    let count = match state.counts.fetch_count().await {
        Ok(count) => count,
        Err(e) => {
            warn!("[Stream] {} initial count failed: {}", connection.id(), e);
            return Err(e);
        }
    };
    if let Err(e) = connection.push(encode_count(count)) {
        debug!("[Stream] {} initial push failed: {:?}", connection.id(), e);
    }

    state.registry.register(connection.clone());
    let guard = DisconnectGuard {
        connection: connection.clone(),
        registry: state.registry.clone(),
    };
    info!(
        "[Stream] {} connected, {} open",
        connection.id(),
        state.registry.len()
    );

    PollLoop::new(
        connection.clone(),
        state.registry.clone(),
        state.counts.clone(),
        state.config.poll_interval,
    )
    .spawn();

    let heartbeat = state.config.heartbeat;
    let stream = async_stream::stream! {
        let _guard = guard;
        let mut keep_alive = heartbeat.map(|period| interval_at(Instant::now() + period, period));

        loop {
            let frame = match keep_alive.as_mut() {
                Some(ticker) => tokio::select! {
                    frame = frames.recv() => frame,
                    _ = ticker.tick() => Some(encode_keep_alive()),
                },
                None => frames.recv().await,
            };

            match frame {
                Some(frame) => yield Ok::<_, Infallible>(frame),
                // Sender dropped: the connection was closed
                None => break,
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, EVENT_STREAM)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(stream))
        .map_err(|e| {
            error!("[Stream] Failed to build response: {}", e);
            Error::Internal(e.to_string())
        })
}
