pub mod payload;

use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tracing::error;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::UpstreamPayload;

/// Raw upstream body, delivered in chunks of arbitrary size and alignment.
pub type UpstreamBody = BoxStream<'static, Result<Bytes, AppError>>;

/// Status line and unread body of the upstream response.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: UpstreamBody,
}

/// The outbound side of the relay: one call per inbound request, no retries.
///
/// Handlers only see this trait, so tests can script the upstream without a network.
#[async_trait::async_trait]
pub trait ChatUpstream: Send + Sync {
    async fn send(&self, payload: &UpstreamPayload) -> Result<UpstreamResponse, AppError>;
}

/// [`ChatUpstream`] backed by the Coze v3 chat endpoint.
#[derive(Clone)]
pub struct CozeClient {
    http: reqwest::Client,
    api_url: String,
    access_token: String,
}

impl CozeClient {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            access_token: config.access_token.clone(),
        })
    }
}

#[async_trait::async_trait]
impl ChatUpstream for CozeClient {
    async fn send(&self, payload: &UpstreamPayload) -> Result<UpstreamResponse, AppError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| AppError::Unexpected(format!("Failed to serialize upstream payload: {e}")))?;

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_LENGTH, body.len())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!("Upstream request to {} failed: {e}", self.api_url);
                AppError::TransportFailure(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .bytes_stream()
            .map_err(|e| AppError::TransportFailure(e.to_string()))
            .boxed();

        Ok(UpstreamResponse { status, body })
    }
}

/// Reads a rejected response to the end and turns it into [`AppError::UpstreamRejected`].
pub async fn drain_error(status: StatusCode, mut body: UpstreamBody) -> AppError {
    let mut raw = Vec::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => raw.extend_from_slice(&bytes),
            Err(e) => {
                error!("Upstream error body could not be read ({status}): {e}");
                return e;
            }
        }
    }

    error!(
        "Upstream API error ({}): {}",
        status.as_u16(),
        String::from_utf8_lossy(&raw)
    );
    AppError::upstream_rejected(status, &raw)
}
