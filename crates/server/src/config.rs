//! Waitlist server configuration

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::broadcast::Broadcaster;
use crate::error::{Error, Result};
use crate::registry::ConnectionRegistry;
use crate::store::{CountStore, GoogleSheets, MemorySheets, SheetStore};

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_SHEETS_API: &str = "https://sheets.googleapis.com";

/// Which row store backs the service
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Google,
    Memory,
}

/// Service-account credentials for the spreadsheet API
#[derive(Clone)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Configuration for the waitlist server
#[derive(Clone)]
pub struct WaitlistConfig {
    /// Spreadsheet identifier
    pub sheet_id: Option<String>,
    /// Service-account email
    pub client_email: Option<String>,
    /// Service-account PEM private key
    pub private_key: Option<String>,
    /// Range whose populated rows are counted as signups
    pub count_range: String,
    /// Range signup rows are appended to
    pub append_range: String,
    /// Range holding the display statistics row
    pub stats_range: String,
    /// Shared secret for the webhook routes
    pub webhook_secret: Option<String>,
    /// Process-wide poll period for every stream connection
    pub poll_interval: Duration,
    /// Keep-alive comment period, None disables keep-alives
    pub heartbeat: Option<Duration>,
    pub bind_addr: SocketAddr,
    pub backend: StoreBackend,
    pub token_uri: String,
    pub sheets_api: String,
}

impl Default for WaitlistConfig {
    fn default() -> Self {
        Self {
            sheet_id: None,
            client_email: None,
            private_key: None,
            count_range: "Waitlist!A:A".to_string(),
            append_range: "Waitlist!A:E".to_string(),
            stats_range: "Stats!A2:C2".to_string(),
            webhook_secret: None,
            poll_interval: Duration::from_secs(30),
            heartbeat: Some(Duration::from_secs(15)),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            backend: StoreBackend::Google,
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            sheets_api: DEFAULT_SHEETS_API.to_string(),
        }
    }
}

impl std::fmt::Debug for WaitlistConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitlistConfig")
            .field("sheet_id", &self.sheet_id)
            .field("client_email", &self.client_email)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("count_range", &self.count_range)
            .field("append_range", &self.append_range)
            .field("stats_range", &self.stats_range)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("poll_interval", &self.poll_interval)
            .field("heartbeat", &self.heartbeat)
            .field("bind_addr", &self.bind_addr)
            .field("backend", &self.backend)
            .finish()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_secs(name: &str) -> Option<u64> {
    env_var(name).and_then(|v| v.parse().ok())
}

impl WaitlistConfig {
    /// Load configuration from the deployment environment.
    ///
    /// Missing credentials are not fatal here; they surface as
    /// [`Error::Configuration`] on every request that needs the store.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            sheet_id: env_var("GOOGLE_SHEET_ID"),
            client_email: env_var("GOOGLE_CLIENT_EMAIL"),
            // Keys pasted into env files usually carry literal "\n" escapes
            private_key: env_var("GOOGLE_PRIVATE_KEY").map(|k| k.replace("\\n", "\n")),
            count_range: env_var("WAITLIST_COUNT_RANGE").unwrap_or(defaults.count_range),
            append_range: env_var("WAITLIST_APPEND_RANGE").unwrap_or(defaults.append_range),
            stats_range: env_var("WAITLIST_STATS_RANGE").unwrap_or(defaults.stats_range),
            webhook_secret: env_var("WAITLIST_WEBHOOK_SECRET"),
            poll_interval: env_secs("WAITLIST_POLL_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            heartbeat: match env_secs("WAITLIST_HEARTBEAT_SECS") {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.heartbeat,
            },
            bind_addr: env_var("WAITLIST_BIND_ADDR")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            backend: match env_var("WAITLIST_STORE").as_deref() {
                Some("memory") => StoreBackend::Memory,
                _ => StoreBackend::Google,
            },
            token_uri: env_var("GOOGLE_TOKEN_URI").unwrap_or(defaults.token_uri),
            sheets_api: env_var("GOOGLE_SHEETS_API").unwrap_or(defaults.sheets_api),
        }
    }

    /// Names of required settings that are absent
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_email.is_none() {
            missing.push("GOOGLE_CLIENT_EMAIL");
        }
        if self.private_key.is_none() {
            missing.push("GOOGLE_PRIVATE_KEY");
        }
        if self.sheet_id.is_none() {
            missing.push("GOOGLE_SHEET_ID");
        }
        missing
    }

    /// Spreadsheet id and credentials, or the configuration error naming what is absent
    pub fn service_account(&self) -> Result<(String, ServiceAccount)> {
        match (&self.sheet_id, &self.client_email, &self.private_key) {
            (Some(sheet_id), Some(client_email), Some(private_key)) => Ok((
                sheet_id.clone(),
                ServiceAccount {
                    client_email: client_email.clone(),
                    private_key: private_key.clone(),
                },
            )),
            _ => Err(Error::Configuration(format!(
                "Missing {}",
                self.missing().join(", ")
            ))),
        }
    }

    pub fn webhook_secret(&self) -> Result<&str> {
        self.webhook_secret
            .as_deref()
            .ok_or_else(|| Error::Configuration("Missing WAITLIST_WEBHOOK_SECRET".to_string()))
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<WaitlistConfig>,
    pub sheets: Arc<dyn SheetStore>,
    pub counts: CountStore,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Broadcaster,
}

impl AppState {
    /// Wire the services around an explicit row store
    pub fn new(config: WaitlistConfig, sheets: Arc<dyn SheetStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let counts = CountStore::new(sheets.clone(), config.count_range.clone());
        let broadcaster = Broadcaster::new(registry.clone());

        Self {
            config: Arc::new(config),
            sheets,
            counts,
            registry,
            broadcaster,
        }
    }

    /// Build the row store the configuration selects
    pub fn from_config(config: WaitlistConfig) -> Self {
        let sheets: Arc<dyn SheetStore> = match config.backend {
            StoreBackend::Google => Arc::new(GoogleSheets::new(&config)),
            StoreBackend::Memory => Arc::new(MemorySheets::with_headers(&[
                (
                    "Waitlist",
                    &["Timestamp", "Name", "Email", "Phone", "Reason"][..],
                ),
                (
                    "Stats",
                    &["Timestamp", "Development Progress", "Target Launch"][..],
                ),
            ])),
        };
        Self::new(config, sheets)
    }
}
