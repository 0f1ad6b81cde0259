//! Waitlist HTTP handlers and router

use crate::config::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub mod count;
pub mod signup;
pub mod stats;
pub mod stream;
pub mod webhook;

pub fn router() -> Router<AppState> {
    Router::new()
        // Signup write
        .route("/api/waitlist", post(signup::signup))
        // Count reads
        .route("/api/waitlist/count", get(count::get_count))
        .route("/api/waitlist/stream", get(stream::stream_count))
        // Secret-authenticated read and broadcast trigger
        .route(
            "/api/waitlist/webhook",
            get(webhook::webhook_count).post(webhook::webhook_notify),
        )
        // Display statistics
        .route("/api/sheets", get(stats::get_stats))
}
