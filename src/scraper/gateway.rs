//! Reqwest-backed [`ChannelClient`] speaking to a Telegram gateway service.
//!
//! The gateway owns session handling and the MTProto transport; this client
//! only issues HTTP requests against its REST surface. The base URL is
//! configurable so tests can point it at a local mock server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use super::{ChannelClient, ChannelMessage, ClientError};

/// Wire shape of one gateway message.
#[derive(Debug, Deserialize)]
struct GatewayMessage {
    id: i64,
    date: DateTime<Utc>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    has_photo: bool,
    #[serde(default)]
    views: Option<i64>,
    #[serde(default)]
    forwards: Option<i64>,
}

/// HTTP client for the Telegram gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    base_url: Url,
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        let mut base_url = Url::parse(base_url)?;
        // Url::join treats a path without a trailing slash as a file.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        self.base_url
            .join(&segments.join("/"))
            .map_err(|err| ClientError::Malformed(err.to_string()))
    }

    /// Map a non-success response to the structured client error, honoring
    /// the provider's Retry-After on throttling.
    async fn error_for(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return ClientError::FloodWait { retry_after_secs };
        }
        let body = response.text().await.unwrap_or_default();
        ClientError::Http { status, body }
    }
}

#[async_trait]
impl ChannelClient for GatewayClient {
    async fn fetch_messages(
        &self,
        channel: &str,
        limit: usize,
        min_id: Option<i64>,
    ) -> Result<Vec<ChannelMessage>, ClientError> {
        let mut url = self.endpoint(&["channels", channel, "messages"])?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        if let Some(min_id) = min_id {
            url.query_pairs_mut().append_pair("min_id", &min_id.to_string());
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| ClientError::Network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let messages: Vec<GatewayMessage> = response
            .json()
            .await
            .map_err(|err| ClientError::Malformed(err.to_string()))?;

        Ok(messages
            .into_iter()
            .map(|m| ChannelMessage {
                id: m.id,
                date: m.date,
                text: m.text,
                has_photo: m.has_photo,
                views: m.views,
                forwards: m.forwards,
            })
            .collect())
    }

    async fn download_photo(
        &self,
        channel: &str,
        message_id: i64,
        dest: &std::path::Path,
    ) -> Result<bool, ClientError> {
        let url = self.endpoint(&["channels", channel, "messages", &message_id.to_string(), "photo"])?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| ClientError::Network(err.to_string()))?;

        if response.status().as_u16() == 404 {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| ClientError::Network(err.to_string()))?;
        std::fs::write(dest, &bytes).map_err(|err| ClientError::Network(err.to_string()))?;
        Ok(true)
    }
}
