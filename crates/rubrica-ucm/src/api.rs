//! Low-level PBX API calls
//!
//! Requests are `POST {"request": {"action": ..., ...}}`; replies carry a
//! numeric `status` (0 on success) and a `response` object.

use crate::error::UcmError;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use rubrica_core::config::UcmConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, instrument};

/// The subset of the PBX API used by the pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UcmApi: Send + Sync {
    /// Ask for a login challenge for `user`
    async fn challenge(&self, user: &str) -> Result<String, UcmError>;

    /// Submit the challenge response; returns the session cookie
    async fn login(&self, user: &str, token: &str) -> Result<String, UcmError>;

    /// Ring `caller` and, once answered, dial `outbound`
    async fn dial_outbound(&self, cookie: &str, caller: &str, outbound: &str) -> Result<(), UcmError>;
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    #[serde(default)]
    status: Option<i64>,
    #[serde(default)]
    response: Option<Value>,
}

/// HTTPS implementation of [`UcmApi`]
pub struct HttpUcmApi {
    http_client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl HttpUcmApi {
    /// Create a client for `base_url` (e.g. `https://192.168.0.240:8089/api`)
    ///
    /// With `verify_tls` false the client accepts the PBX's self-signed
    /// certificate. The relaxation applies to this client only.
    pub fn new(base_url: &str, timeout: Duration, verify_tls: bool) -> Result<Self, UcmError> {
        let http_client = ClientBuilder::new()
            .timeout(timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| UcmError::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn from_config(config: &UcmConfig) -> Result<Self, UcmError> {
        Self::new(&config.base_url(), config.request_timeout(), config.verify_tls)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self, request), fields(action = %action))]
    async fn call(&self, action: &str, request: Value) -> Result<Value, UcmError> {
        debug!("PBX API request");

        let response = self
            .http_client
            .post(&self.base_url)
            .json(&json!({ "request": request }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UcmError::Timeout(self.timeout_secs)
                } else {
                    UcmError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("PBX API HTTP error: status={}", status);
            return Err(UcmError::HttpError(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UcmError::ParseError(format!("Failed to read response body: {}", e)))?;

        parse_reply(&body)
    }
}

/// Decode a reply body, mapping a non-zero `status` to [`UcmError::Api`]
fn parse_reply(body: &str) -> Result<Value, UcmError> {
    let reply: ApiReply = serde_json::from_str(body)
        .map_err(|e| UcmError::ParseError(format!("Failed to parse JSON: {} - Body: {}", e, body)))?;

    let response = reply.response.unwrap_or(Value::Null);

    match reply.status {
        Some(status) if status != 0 => {
            let message = response
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Error code: {}", status));
            Err(UcmError::Api { status, message })
        }
        _ => Ok(response),
    }
}

fn non_empty_field(response: &Value, field: &str) -> Option<String> {
    response
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl UcmApi for HttpUcmApi {
    async fn challenge(&self, user: &str) -> Result<String, UcmError> {
        let response = self
            .call(
                "challenge",
                json!({ "action": "challenge", "user": user, "version": "1.0" }),
            )
            .await?;

        non_empty_field(&response, "challenge").ok_or(UcmError::MissingChallenge)
    }

    async fn login(&self, user: &str, token: &str) -> Result<String, UcmError> {
        let response = self
            .call(
                "login",
                json!({ "action": "login", "user": user, "token": token }),
            )
            .await?;

        non_empty_field(&response, "cookie").ok_or(UcmError::MissingCookie)
    }

    async fn dial_outbound(&self, cookie: &str, caller: &str, outbound: &str) -> Result<(), UcmError> {
        self.call(
            "dialOutbound",
            json!({
                "action": "dialOutbound",
                "cookie": cookie,
                "caller": caller,
                "outbound": outbound,
            }),
        )
        .await?;

        Ok(())
    }
}
