//! Google Sheets v4 row store
//!
//! Authenticates as a service account: a short-lived RS256 JWT is exchanged
//! at the OAuth token endpoint for a bearer token, which is reused until
//! shortly before it expires.

use crate::config::{ServiceAccount, WaitlistConfig};
use crate::error::{Error, Result};
use crate::store::{Row, SheetStore};
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh the bearer token this long before Google expires it
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct AppendBody<'a> {
    values: [&'a Row; 1],
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

pub struct GoogleSheets {
    client: Client,
    account: Option<(String, ServiceAccount)>,
    missing: Vec<&'static str>,
    token_uri: String,
    api_base: String,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleSheets {
    pub fn new(config: &WaitlistConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &WaitlistConfig) -> Self {
        Self {
            client,
            account: config.service_account().ok(),
            missing: config.missing(),
            token_uri: config.token_uri.clone(),
            api_base: config.sheets_api.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        }
    }

    fn account(&self) -> Result<&(String, ServiceAccount)> {
        self.account.as_ref().ok_or_else(|| {
            Error::Configuration(format!("Missing {}", self.missing.join(", ")))
        })
    }

    /// `{api}/v4/spreadsheets/{id}/values/{range}{suffix}` with every part escaped
    fn values_url(&self, sheet_id: &str, range: &str, suffix: &str) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| Error::Configuration(format!("Invalid GOOGLE_SHEETS_API: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Configuration("GOOGLE_SHEETS_API cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", sheet_id, "values"])
            .push(&format!("{}{}", range, suffix));
        Ok(url)
    }

    fn sign_assertion(&self, account: &ServiceAccount) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &account.client_email,
            scope: SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| Error::StoreAuth(format!("Invalid service account key: {}", e)))?;
        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| Error::StoreAuth(format!("Failed to sign assertion: {}", e)))
    }

    async fn access_token(&self, account: &ServiceAccount) -> Result<String> {
        let cached = self
            .token
            .lock()
            .as_ref()
            .filter(|cached| cached.expires_at > Instant::now() + TOKEN_MARGIN)
            .map(|cached| cached.token.clone());
        if let Some(token) = cached {
            return Ok(token);
        }

        let assertion = self.sign_assertion(account)?;
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", JWT_BEARER_GRANT)
            .append_pair("assertion", &assertion)
            .finish();

        let response = self
            .client
            .post(&self.token_uri)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("[Sheets] Token exchange failed with {}", status);
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Error::StoreAuth(format!("{}: {}", status, body))
                }
                _ => Error::StoreUnavailable(format!("Token endpoint returned {}", status)),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::StoreFormat(format!("Token response: {}", e)))?;

        info!("[Sheets] Obtained access token for {}", account.client_email);
        *self.token.lock() = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });

        Ok(token.access_token)
    }

    /// Map a non-success API status onto the error taxonomy
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Error::StoreAuth(format!("{}: {}", status, body))
            }
            _ => Error::StoreUnavailable(format!("{}: {}", status, body)),
        })
    }
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetStore for GoogleSheets {
    fn ensure_configured(&self) -> Result<()> {
        self.account().map(|_| ())
    }

    async fn read_range(&self, range: &str) -> Result<Vec<Row>> {
        let (sheet_id, account) = self.account()?;
        let url = self.values_url(sheet_id, range, "")?;
        let token = self.access_token(account).await?;

        debug!("[Sheets] GET {}", range);
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let values: ValueRange = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::StoreFormat(format!("Values response: {}", e)))?;

        Ok(values
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn append_row(&self, range: &str, row: Row) -> Result<()> {
        let (sheet_id, account) = self.account()?;
        let mut url = self.values_url(sheet_id, range, ":append")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        let token = self.access_token(account).await?;

        debug!("[Sheets] APPEND {} ({} cells)", range, row.len());
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&AppendBody { values: [&row] })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
