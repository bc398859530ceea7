// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signed HTTP client for the OVH REST API.
//!
//! One [`OvhClient`] is bound to one account and signs every request with
//! the OVH application scheme: `$1$` followed by the hex SHA-1 of
//! `appSecret+consumerKey+METHOD+url+body+timestamp`. The timestamp uses a
//! drift delta fetched once from `/auth/time`.

use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use ovhsnap_core::{Account, SnapError};

/// Per-call deadline. The order driver layers its own sequence deadline on top.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(20);

/// Error body shape returned by the OVH API.
#[derive(Debug, Deserialize)]
struct OvhErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    class: Option<String>,
}

/// A signing, rate-disciplined client for one OVH account.
///
/// Thread-safe; shared read-only after construction. Requests run on the
/// caller's task — per-account concurrency discipline lives in the queue
/// scheduler, not here.
pub struct OvhClient {
    account: Account,
    http: reqwest::Client,
    base_url: String,
    /// Remote-minus-local clock delta in seconds, fetched lazily.
    time_delta: OnceCell<i64>,
}

impl OvhClient {
    /// Build a client for the account's endpoint region.
    pub fn new(account: Account) -> Result<Self, SnapError> {
        let http = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| SnapError::Internal(format!("failed to build HTTP client: {e}")))?;
        let base_url = account.endpoint_region.base_url().to_string();
        Ok(Self {
            account,
            http,
            base_url,
            time_delta: OnceCell::new(),
        })
    }

    /// Override the API root (tests point this at a mock server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Issue a signed request and return the raw success body.
    ///
    /// Non-2xx responses are mapped into the typed error taxonomy
    /// (401/403 auth, 404 not-found, 409 conflict, 429 rate-limit, 5xx
    /// server); connection failures become `Network`, deadline overruns
    /// `Timeout`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, Bytes), SnapError> {
        let url = format!("{}{}", self.base_url, path);
        let body_str = body.map(|v| v.to_string()).unwrap_or_default();
        let timestamp = Utc::now().timestamp() + self.time_delta().await;
        let signature = sign_request(
            &self.account.application_secret,
            &self.account.consumer_key,
            method.as_str(),
            &url,
            &body_str,
            timestamp,
        );

        let mut req = self
            .http
            .request(method.clone(), &url)
            .header("X-Ovh-Application", &self.account.application_key)
            .header("X-Ovh-Consumer", &self.account.consumer_key)
            .header("X-Ovh-Timestamp", timestamp.to_string())
            .header("X-Ovh-Signature", signature)
            .header("Content-Type", "application/json");
        if body.is_some() {
            req = req.body(body_str);
        }

        let response = req.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        debug!(%status, %url, account = %self.account.id, "ovh response");

        if status.is_success() {
            return Ok((status, bytes));
        }

        let (code, message) = match serde_json::from_slice::<OvhErrorBody>(&bytes) {
            Ok(parsed) => (
                parsed.class.unwrap_or_default(),
                parsed
                    .message
                    .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned()),
            ),
            Err(_) => (String::new(), String::from_utf8_lossy(&bytes).into_owned()),
        };
        Err(SnapError::from_status(status.as_u16(), code, message))
    }

    /// GET a JSON document.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SnapError> {
        let (_, bytes) = self.request(Method::GET, path, None).await?;
        parse_json(&bytes)
    }

    /// POST a JSON body and parse the JSON response.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, SnapError> {
        let (_, bytes) = self.request(Method::POST, path, Some(body)).await?;
        parse_json(&bytes)
    }

    /// POST with no body, discarding the response.
    pub async fn post_empty(&self, path: &str) -> Result<(), SnapError> {
        self.request(Method::POST, path, None).await?;
        Ok(())
    }

    /// Remote-minus-local clock delta, fetched once and cached.
    ///
    /// Best-effort: on failure the local clock is used and a warning logged.
    async fn time_delta(&self) -> i64 {
        *self
            .time_delta
            .get_or_init(|| async {
                match self.fetch_remote_time().await {
                    Ok(remote) => {
                        let delta = remote - Utc::now().timestamp();
                        debug!(delta, "ovh clock delta");
                        delta
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to fetch OVH server time, using local clock");
                        0
                    }
                }
            })
            .await
    }

    async fn fetch_remote_time(&self) -> Result<i64, SnapError> {
        let url = format!("{}/auth/time", self.base_url);
        let response = self.http.get(&url).send().await.map_err(map_transport_error)?;
        let text = response.text().await.map_err(map_transport_error)?;
        text.trim()
            .parse::<i64>()
            .map_err(|e| SnapError::Network {
                message: format!("unparseable /auth/time response: {e}"),
            })
    }
}

impl std::fmt::Debug for OvhClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OvhClient")
            .field("account", &self.account)
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn parse_json<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, SnapError> {
    serde_json::from_slice(bytes).map_err(|e| SnapError::Network {
        message: format!("unparseable API response: {e}"),
    })
}

fn map_transport_error(e: reqwest::Error) -> SnapError {
    if e.is_timeout() {
        SnapError::Timeout {
            duration: CALL_TIMEOUT,
        }
    } else {
        SnapError::Network {
            message: e.to_string(),
        }
    }
}

/// Compute the `X-Ovh-Signature` header value.
fn sign_request(
    application_secret: &str,
    consumer_key: &str,
    method: &str,
    url: &str,
    body: &str,
    timestamp: i64,
) -> String {
    let payload =
        format!("{application_secret}+{consumer_key}+{method}+{url}+{body}+{timestamp}");
    let digest = ring::digest::digest(
        &ring::digest::SHA1_FOR_LEGACY_USE_ONLY,
        payload.as_bytes(),
    );
    format!("$1${}", hex::encode(digest.as_ref()))
}
