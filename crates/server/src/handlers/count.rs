use crate::config::AppState;
use crate::error::Result;
use axum::{extract::State, Json};
use tracing::error;
use waitlist_http::CountUpdate;

/// GET /api/waitlist/count
pub async fn get_count(State(state): State<AppState>) -> Result<Json<CountUpdate>> {
    let count = state.counts.fetch_count().await.map_err(|e| {
        error!("[Count] Failed to get waitlist count: {}", e);
        e
    })?;
    Ok(Json(CountUpdate { count }))
}
