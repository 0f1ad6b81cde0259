//! Waitlist Server Library
//!
//! Signup intake plus a live signup-count event stream, with a spreadsheet
//! as the row store.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod handlers;
pub mod poll;
pub mod registry;
pub mod store;

use axum::{routing::get, Router};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub use config::{AppState, StoreBackend, WaitlistConfig};
pub use error::{Error, Result};

/// Full application router with middleware
pub fn app(state: AppState) -> Router {
    handlers::router()
        .route("/health", get(health_check))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Install the global subscriber; `RUST_LOG` overrides the default level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        // Already set, ignore
    }
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("=== Waitlist Server ===");

    let config = WaitlistConfig::from_env();
    match config.backend {
        StoreBackend::Google => {
            let missing = config.missing();
            if missing.is_empty() {
                info!("Store: Google Sheets");
            } else {
                warn!(
                    "Missing {}; store-backed routes will answer with a configuration error",
                    missing.join(", ")
                );
            }
        }
        StoreBackend::Memory => info!("Store: in-memory (data is lost on restart)"),
    }
    if config.webhook_secret.is_none() {
        warn!("WAITLIST_WEBHOOK_SECRET not set; webhook routes are disabled");
    }
    info!(
        "Poll interval: {:?}, heartbeat: {:?}",
        config.poll_interval, config.heartbeat
    );

    let addr = config.bind_addr;
    let state = AppState::from_config(config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Waitlist server listening on http://{}", addr);
    axum::serve(listener, app(state)).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK - Waitlist Server"
}
