use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;

/// One turn of the caller's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Inbound body of `POST /api/chat`, read-only once parsed.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
    /// Pre-shaped upstream messages. When present they are forwarded verbatim
    /// and `messages` is ignored.
    #[serde(default)]
    pub additional_messages: Option<Value>,
    #[serde(default, rename = "userId", alias = "user_id")]
    pub user_id: Option<String>,
}

impl ChatRequest {
    pub fn from_json(body: &[u8]) -> Result<Self, AppError> {
        let request: ChatRequest =
            serde_json::from_slice(body).map_err(|e| AppError::malformed(e.to_string()))?;

        if request.additional_messages.is_none() && request.messages.is_none() {
            return Err(AppError::malformed(
                "either `messages` or `additional_messages` is required",
            ));
        }
        Ok(request)
    }
}

/// A caller message in the upstream's wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamMessage {
    pub role: String,
    pub content: String,
    pub content_type: &'static str,
}

impl From<Message> for UpstreamMessage {
    fn from(m: Message) -> Self {
        Self { role: m.role, content: m.content, content_type: "text" }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AdditionalMessages {
    Verbatim(Value),
    Converted(Vec<UpstreamMessage>),
}

/// Body of the single outbound chat call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamPayload {
    pub bot_id: String,
    pub user_id: String,
    pub additional_messages: AdditionalMessages,
    pub stream: bool,
    pub auto_save_history: bool,
}
