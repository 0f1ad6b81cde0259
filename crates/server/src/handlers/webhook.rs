//! Webhook routes for callers outside the browser, e.g. a spreadsheet
//! script that adds rows directly. Both require the shared secret.

use crate::config::AppState;
use crate::error::{Error, Result};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use waitlist_http::CountUpdate;

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    pub secret: Option<String>,
}

/// Compare without short-circuiting on the first differing byte
fn secret_matches(given: &str, expected: &str) -> bool {
    given.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn verify_secret(state: &AppState, query: &WebhookQuery) -> Result<()> {
    let expected = state.config.webhook_secret()?;
    match query.secret.as_deref() {
        Some(secret) if secret_matches(secret, expected) => Ok(()),
        _ => {
            warn!("[Webhook] Invalid webhook secret");
            Err(Error::Unauthorized)
        }
    }
}

/// GET /api/waitlist/webhook?secret=...
pub async fn webhook_count(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
) -> Result<Json<CountUpdate>> {
    verify_secret(&state, &query)?;
    let count = state.counts.fetch_count().await?;
    Ok(Json(CountUpdate { count }))
}

/// POST /api/waitlist/webhook?secret=...
///
/// Re-reads the count and pushes it to every open stream.
pub async fn webhook_notify(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
) -> Result<Json<Value>> {
    verify_secret(&state, &query)?;
    let count = state.counts.fetch_count().await?;
    let report = state.broadcaster.broadcast(count);
    info!(
        "[Webhook] Broadcast count {} to {} connections",
        count, report.delivered
    );
    Ok(Json(json!({ "count": count, "delivered": report.delivered })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_matches() {
        assert!(secret_matches("s3cret", "s3cret"));
        assert!(!secret_matches("s3creT", "s3cret"));
        assert!(!secret_matches("s3cre", "s3cret"));
        assert!(!secret_matches("", "s3cret"));
    }
}
