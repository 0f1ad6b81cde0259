use async_trait::async_trait;
use axum::body::{Body, BodyDataStream};
use axum::http::{header, Request, StatusCode};
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tower::ServiceExt;
use waitlist_server::error::{Error, Result};
use waitlist_server::store::{Row, SheetStore};
use waitlist_server::{app, AppState, WaitlistConfig};

/// Row store whose signup count, failure mode and read count the test controls
struct FakeSheets {
    signups: Mutex<usize>,
    reads: AtomicUsize,
    failing: AtomicBool,
    configured: bool,
}

impl FakeSheets {
    fn new(signups: usize) -> Arc<Self> {
        Arc::new(Self {
            signups: Mutex::new(signups),
            reads: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            configured: true,
        })
    }

    fn unconfigured() -> Arc<Self> {
        Arc::new(Self {
            signups: Mutex::new(0),
            reads: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            configured: false,
        })
    }

    fn set_signups(&self, signups: usize) {
        *self.signups.lock() = signups;
    }

    fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SheetStore for FakeSheets {
    fn ensure_configured(&self) -> Result<()> {
        if self.configured {
            Ok(())
        } else {
            Err(Error::Configuration("Missing GOOGLE_SHEET_ID".into()))
        }
    }

    async fn read_range(&self, _range: &str) -> Result<Vec<Row>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("503 Service Unavailable".into()));
        }
        let mut rows = vec![vec!["Timestamp".to_string()]];
        rows.extend((0..*self.signups.lock()).map(|i| vec![format!("row {}", i)]));
        Ok(rows)
    }

    async fn append_row(&self, _range: &str, _row: Row) -> Result<()> {
        *self.signups.lock() += 1;
        Ok(())
    }
}

/// Row store whose reads wait until the test lets them through
struct GatedSheets {
    signups: usize,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl SheetStore for GatedSheets {
    async fn read_range(&self, _range: &str) -> Result<Vec<Row>> {
        self.entered.notify_one();
        self.release.notified().await;
        let mut rows = vec![vec!["Timestamp".to_string()]];
        rows.extend((0..self.signups).map(|i| vec![format!("row {}", i)]));
        Ok(rows)
    }

    async fn append_row(&self, _range: &str, _row: Row) -> Result<()> {
        Ok(())
    }
}

fn state(sheets: Arc<dyn SheetStore>, heartbeat: Option<Duration>) -> AppState {
    let config = WaitlistConfig {
        poll_interval: Duration::from_secs(30),
        heartbeat,
        ..Default::default()
    };
    AppState::new(config, sheets)
}

async fn open_stream(state: &AppState) -> axum::response::Response {
    app(state.clone())
        .oneshot(
            Request::get("/api/waitlist/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn next_frame(body: &mut BodyDataStream) -> Option<Bytes> {
    body.next().await.map(|chunk| chunk.unwrap())
}

fn count_frame(count: u64) -> Bytes {
    Bytes::from(format!("data: {{\"count\":{}}}\n\n", count))
}

#[tokio::test(start_paused = true)]
async fn test_initial_snapshot_is_sent_immediately() {
    let sheets = FakeSheets::new(7);
    let state = state(sheets.clone(), None);

    let response = open_stream(&state).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

    let mut body = response.into_body().into_data_stream();
    let started = tokio::time::Instant::now();
    assert_eq!(next_frame(&mut body).await, Some(count_frame(7)));
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(state.registry.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_poll_pushes_new_count_then_disconnect_cleans_up() {
    let sheets = FakeSheets::new(2);
    let state = state(sheets.clone(), None);

    let mut body = open_stream(&state).await.into_body().into_data_stream();
    assert_eq!(next_frame(&mut body).await, Some(count_frame(2)));

    sheets.set_signups(3);
    let started = tokio::time::Instant::now();
    assert_eq!(next_frame(&mut body).await, Some(count_frame(3)));
    assert!(started.elapsed() >= Duration::from_secs(30));

    drop(body);
    assert!(state.registry.is_empty());
    assert_eq!(state.broadcaster.broadcast(4).delivered, 0);

    // The poll loop is gone: no further store reads
    let reads = sheets.reads();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(sheets.reads(), reads);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_ends_stream() {
    let sheets = FakeSheets::new(1);
    let state = state(sheets.clone(), None);

    let mut body = open_stream(&state).await.into_body().into_data_stream();
    assert_eq!(next_frame(&mut body).await, Some(count_frame(1)));

    sheets.fail();
    assert_eq!(next_frame(&mut body).await, None);
    assert!(state.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_initial_fetch_registers_nothing() {
    let sheets = FakeSheets::new(1);
    sheets.fail();
    let state = state(sheets.clone(), None);

    let response = open_stream(&state).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(state.registry.is_empty());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(sheets.reads(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_configuration_refuses_stream() {
    let sheets = FakeSheets::unconfigured();
    let state = state(sheets.clone(), None);

    let response = open_stream(&state).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "Server configuration error");

    assert!(state.registry.is_empty());
    assert_eq!(sheets.reads(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_keep_alive_between_counts() {
    let sheets = FakeSheets::new(5);
    let state = state(sheets.clone(), Some(Duration::from_secs(12)));

    let mut body = open_stream(&state).await.into_body().into_data_stream();
    assert_eq!(next_frame(&mut body).await, Some(count_frame(5)));
    assert_eq!(
        next_frame(&mut body).await,
        Some(Bytes::from_static(b": keep-alive\n\n"))
    );
    assert_eq!(
        next_frame(&mut body).await,
        Some(Bytes::from_static(b": keep-alive\n\n"))
    );
    assert_eq!(next_frame(&mut body).await, Some(count_frame(5)));
}

#[tokio::test(start_paused = true)]
async fn test_streams_are_independent() {
    let sheets = FakeSheets::new(2);
    let state = state(sheets.clone(), None);

    let mut first = open_stream(&state).await.into_body().into_data_stream();
    let mut second = open_stream(&state).await.into_body().into_data_stream();
    assert_eq!(next_frame(&mut first).await, Some(count_frame(2)));
    assert_eq!(next_frame(&mut second).await, Some(count_frame(2)));
    assert_eq!(state.registry.len(), 2);

    drop(first);
    assert_eq!(state.registry.len(), 1);

    let report = state.broadcaster.broadcast(9);
    assert_eq!(report.delivered, 1);
    assert_eq!(next_frame(&mut second).await, Some(count_frame(9)));
}

#[tokio::test]
async fn test_broadcast_during_snapshot_read_is_not_delivered_first() {
    let sheets = Arc::new(GatedSheets {
        signups: 4,
        entered: Notify::new(),
        release: Notify::new(),
    });
    let state = state(sheets.clone(), None);

    let opening = {
        let state = state.clone();
        tokio::spawn(async move { open_stream(&state).await })
    };

    // The snapshot read is in flight; the connection is not a broadcast target yet
    sheets.entered.notified().await;
    assert!(state.registry.is_empty());
    assert_eq!(state.broadcaster.broadcast(5).delivered, 0);

    sheets.release.notify_one();
    let response = opening.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.registry.len(), 1);

    let mut body = response.into_body().into_data_stream();
    assert_eq!(next_frame(&mut body).await, Some(count_frame(4)));

    assert_eq!(state.broadcaster.broadcast(5).delivered, 1);
    assert_eq!(next_frame(&mut body).await, Some(count_frame(5)));
}
