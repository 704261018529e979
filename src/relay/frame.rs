use bytes::Bytes;
use serde_json::json;

const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// One unit of the caller-facing stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    /// An incremental fragment of the answer text.
    Content(String),
    /// The terminal sentinel.
    Done,
}

impl RelayFrame {
    /// Wire form: `data: <json>\n\n`, or `data: [DONE]\n\n` for the sentinel.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            RelayFrame::Content(content) => {
                Bytes::from(format!("data: {}\n\n", json!({ "content": content })))
            }
            RelayFrame::Done => Bytes::from_static(DONE_FRAME),
        }
    }
}
