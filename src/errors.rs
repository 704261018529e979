use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

/// Everything that can stop a relay request before its response headers are sent.
///
/// Failures after streaming has begun never become an `AppError`: the status
/// line is already on the wire, so the stream is simply ended.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Caller errors ────────────────────────────────────────────────────────
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    // ── Upstream errors ──────────────────────────────────────────────────────
    #[error("Upstream rejected the request ({status}): {message}")]
    UpstreamRejected {
        status: StatusCode,
        message: String,
        details: Value,
    },

    #[error("Upstream transport failure: {0}")]
    TransportFailure(String),

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn malformed(message: impl Into<String>) -> Self {
        AppError::MalformedRequest(message.into())
    }

    /// Builds an [`AppError::UpstreamRejected`] from a fully drained error body.
    ///
    /// A JSON body becomes `details` verbatim and its `msg` (or `code`) the
    /// headline; anything else is carried through as raw text.
    pub fn upstream_rejected(status: StatusCode, body: &[u8]) -> Self {
        let fallback = format!("API Error: {}", status.as_u16());
        match serde_json::from_slice::<Value>(body) {
            Ok(parsed) => {
                let message = headline(&parsed).unwrap_or(fallback);
                AppError::UpstreamRejected { status, message, details: parsed }
            }
            Err(_) => AppError::UpstreamRejected {
                status,
                message: fallback,
                details: Value::String(String::from_utf8_lossy(body).into_owned()),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamRejected { status, .. } => *status,
            AppError::TransportFailure(_) | AppError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> Value {
        match self {
            AppError::MalformedRequest(reason) => {
                json!({ "error": "Invalid Request", "details": reason })
            }
            AppError::UpstreamRejected { message, details, .. } => {
                json!({ "error": message, "details": details })
            }
            AppError::TransportFailure(_) | AppError::Unexpected(_) => {
                json!({ "error": "Internal Server Error" })
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// `msg` when it is a non-empty string, otherwise a truthy `code`.
fn headline(parsed: &Value) -> Option<String> {
    let msg = parsed
        .get("msg")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    msg.or_else(|| match parsed.get("code")? {
        Value::String(code) if !code.is_empty() => Some(code.clone()),
        Value::Number(code) if code.as_f64() != Some(0.0) => Some(code.to_string()),
        _ => None,
    })
}
