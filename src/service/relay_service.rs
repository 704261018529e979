use std::sync::Arc;

use futures_util::Stream;
use tracing::info;

use crate::errors::AppError;
use crate::models::ChatRequest;
use crate::relay::{relay_frames, RelayFrame};
use crate::upstream::payload::build_payload;
use crate::upstream::{drain_error, ChatUpstream};

#[derive(Clone)]
pub struct RelayService {
    upstream: Arc<dyn ChatUpstream>,
    bot_id: String,
}

impl RelayService {
    pub fn new(upstream: Arc<dyn ChatUpstream>, bot_id: impl Into<String>) -> Self {
        Self { upstream, bot_id: bot_id.into() }
    }

    /// Issues the upstream call and, once it answers with success, hands back
    /// the re-framed stream. Every error here happens before any byte reaches
    /// the caller.
    pub async fn open_stream(
        &self,
        request: ChatRequest,
    ) -> Result<impl Stream<Item = RelayFrame> + Send + 'static, AppError> {
        let payload = build_payload(&self.bot_id, request);
        info!(user_id = %payload.user_id, "forwarding chat request upstream");

        let response = self.upstream.send(&payload).await?;
        if !response.status.is_success() {
            return Err(drain_error(response.status, response.body).await);
        }

        Ok(relay_frames(response.body))
    }
}
