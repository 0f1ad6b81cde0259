use crate::config::AppState;
use crate::error::{Error, Result};
use crate::store::Row;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, Default, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A validated signup, ready to append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitlistEntry {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub reason: String,
}

fn required(field: Option<String>) -> Option<String> {
    field
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl SignupRequest {
    pub fn validate(self, timestamp: DateTime<Utc>) -> Result<WaitlistEntry> {
        let (Some(name), Some(email), Some(reason)) = (
            required(self.name),
            required(self.email),
            required(self.reason),
        ) else {
            return Err(Error::Validation("Missing required fields".to_string()));
        };

        if !EMAIL_REGEX.is_match(&email) {
            return Err(Error::Validation("Invalid email format".to_string()));
        }

        Ok(WaitlistEntry {
            timestamp,
            name,
            email,
            phone: required(self.phone),
            reason,
        })
    }
}

impl WaitlistEntry {
    /// Column order of the waitlist sheet
    pub fn into_row(self) -> Row {
        vec![
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.name,
            self.email,
            self.phone.unwrap_or_default(),
            self.reason,
        ]
    }
}

/// POST /api/waitlist
pub async fn signup(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SignupRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    if let Err(e) = state.sheets.ensure_configured() {
        error!("[Signup] {}", e);
        return Err(e);
    }

    let Json(request) = payload
        .map_err(|e| Error::Validation(format!("Invalid request body: {}", e.body_text())))?;
    let entry = request.validate(Utc::now())?;
    let has_phone = entry.phone.is_some();

    state
        .sheets
        .append_row(&state.config.append_range, entry.into_row())
        .await
        .map_err(|e| {
            error!("[Signup] Failed to append row: {}", e);
            e
        })?;
    info!("[Signup] New waitlist entry (phone: {})", has_phone);

    // Push the new count to open streams without holding up the response
    let broadcaster = state.broadcaster.clone();
    let counts = state.counts.clone();
    tokio::spawn(async move {
        broadcaster.notify_count_update(&counts).await;
    });

    Ok(Json(json!({ "success": true })))
}
