use chrono::Utc;
use uuid::Uuid;

use crate::models::{AdditionalMessages, ChatRequest, UpstreamPayload, UpstreamMessage};

/// Translates a caller request into the upstream payload.
///
/// Pre-shaped `additional_messages` win over `messages`; a missing or empty
/// user id is replaced by a fresh one.
pub fn build_payload(bot_id: &str, request: ChatRequest) -> UpstreamPayload {
    let additional_messages = match (request.additional_messages, request.messages) {
        (Some(verbatim), _) => AdditionalMessages::Verbatim(verbatim),
        (None, messages) => AdditionalMessages::Converted(
            messages
                .unwrap_or_default()
                .into_iter()
                .map(UpstreamMessage::from)
                .collect(),
        ),
    };

    let user_id = request
        .user_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(generate_user_id);

    UpstreamPayload {
        bot_id: bot_id.to_string(),
        user_id,
        additional_messages,
        stream: true,
        auto_save_history: true,
    }
}

/// `user_<unix millis>_<8 hex>`; unique per call, not secret.
pub fn generate_user_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("user_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}
