//! HTTP transport for the reasoning endpoint
//!
//! One call is one round trip. Retrying is the caller's business.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::retry::RemoteError;

/// A single JSON request/response exchange with the remote endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, url: &str, api_key: &str, body: &Value) -> Result<Value, RemoteError>;
}

/// reqwest-backed transport with a fixed request timeout
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, api_key: &str, body: &Value) -> Result<Value, RemoteError> {
        let response = self.client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::debug!("Remote error body: {}", crate::truncate_safe(&text, 500));
            return Err(RemoteError::from_status(status.as_u16()));
        }

        let text = response.text().await.map_err(classify_reqwest)?;
        serde_json::from_str(&text).map_err(|e| {
            RemoteError::Malformed(format!("{} (body: {})", e, crate::truncate_safe(&text, 200)))
        })
    }
}

fn classify_reqwest(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(error.to_string())
    }
}
