use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_util::{Stream, StreamExt};
use tracing::warn;

use crate::models::ChatRequest;
use crate::relay::RelayFrame;
use crate::service::relay_service::RelayService;

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST `/api/chat` — relays one chat turn as an SSE stream of answer fragments.
///
/// The body is read as raw bytes so that malformed JSON gets the relay's own
/// JSON 400 instead of an extractor rejection.
pub async fn chat_handler(State(svc): State<RelayService>, body: Bytes) -> Response {
    let request = match ChatRequest::from_json(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!("Rejecting chat request: {e}");
            return e.into_response();
        }
    };

    match svc.open_stream(request).await {
        Ok(frames) => event_stream(frames),
        Err(e) => e.into_response(),
    }
}

// ── Helper ────────────────────────────────────────────────────────────────────

fn event_stream(frames: impl Stream<Item = RelayFrame> + Send + 'static) -> Response {
    let body = Body::from_stream(frames.map(|frame| Ok::<_, Infallible>(frame.to_bytes())));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::body::{Body, Bytes};
    use axum::http::{Request, StatusCode};
    use futures_util::{stream, StreamExt};
    use serde_json::{json, Value};
    use tokio::sync::Mutex;
    use tower::ServiceExt; // for oneshot

    use crate::errors::AppError;
    use crate::models::{AdditionalMessages, UpstreamMessage, UpstreamPayload};
    use crate::routes::build_router;
    use crate::service::relay_service::RelayService;
    use crate::upstream::{ChatUpstream, UpstreamResponse};

    // -----------------------------------------------------------------------
    // Scripted upstreams
    // -----------------------------------------------------------------------

    #[derive(Clone, Copy)]
    enum Chunk {
        Data(&'static [u8]),
        Fail,
    }

    /// Replays a fixed status and body, and records what it was sent.
    struct ScriptedUpstream {
        status: StatusCode,
        chunks: Vec<Chunk>,
        calls: AtomicUsize,
        last_payload: Mutex<Option<UpstreamPayload>>,
    }

    impl ScriptedUpstream {
        fn new(status: StatusCode, chunks: Vec<Chunk>) -> Arc<Self> {
            Arc::new(Self {
                status,
                chunks,
                calls: AtomicUsize::new(0),
                last_payload: Mutex::new(None),
            })
        }

        fn streaming(chunks: &[&'static [u8]]) -> Arc<Self> {
            Self::new(StatusCode::OK, chunks.iter().copied().map(Chunk::Data).collect())
        }
    }

    #[async_trait::async_trait]
    impl ChatUpstream for ScriptedUpstream {
        async fn send(&self, payload: &UpstreamPayload) -> Result<UpstreamResponse, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_payload.lock().await = Some(payload.clone());

            let items: Vec<Result<Bytes, AppError>> = self
                .chunks
                .iter()
                .map(|chunk| match *chunk {
                    Chunk::Data(bytes) => Ok(Bytes::from_static(bytes)),
                    Chunk::Fail => Err(AppError::TransportFailure("connection reset".into())),
                })
                .collect();

            Ok(UpstreamResponse { status: self.status, body: stream::iter(items).boxed() })
        }
    }

    struct UnreachableUpstream;

    #[async_trait::async_trait]
    impl ChatUpstream for UnreachableUpstream {
        async fn send(&self, _payload: &UpstreamPayload) -> Result<UpstreamResponse, AppError> {
            Err(AppError::TransportFailure("dns error: no such host".into()))
        }
    }

    fn app(upstream: Arc<dyn ChatUpstream>) -> axum::Router {
        build_router(
            RelayService::new(upstream, "bot-test"),
            std::path::Path::new("does-not-exist"),
        )
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const HELLO: &str = r#"{"messages":[{"role":"user","content":"hello"}]}"#;

    // -----------------------------------------------------------------------
    // Streaming
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn relays_delta_answers_as_event_stream() {
        let upstream = ScriptedUpstream::streaming(&[
            b"event:conversation.chat.created\ndata:{\"id\":\"1\"}\n\nevent:conversation.mes",
            b"sage.delta\ndata:{\"type\":\"answer\",\"con",
            b"tent\":\"Hi\"}\n\nevent:conversation.message.delta\ndata:{\"type\":\"answer\",\"content\":\" there\"}\n\n",
            b"event:conversation.message.completed\ndata:{\"type\":\"answer\",\"content\":\"Hi there\"}\n\n",
            b"event:done\ndata:\"[DONE]\"\n\n",
        ]);
        let resp = app(upstream).oneshot(chat_request(HELLO)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "text/event-stream");
        assert_eq!(resp.headers().get("cache-control").unwrap(), "no-cache");
        assert_eq!(resp.headers().get("connection").unwrap(), "keep-alive");
        assert_eq!(
            body_text(resp).await,
            "data: {\"content\":\"Hi\"}\n\ndata: {\"content\":\" there\"}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn builds_upstream_payload_from_messages() {
        let upstream = ScriptedUpstream::streaming(&[b"event:done\n\n"]);
        let resp = app(upstream.clone()).oneshot(chat_request(HELLO)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "data: [DONE]\n\n");

        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
        let payload = upstream.last_payload.lock().await.clone().unwrap();
        assert_eq!(payload.bot_id, "bot-test");
        assert!(payload.user_id.starts_with("user_"));
        assert!(payload.stream);
        assert!(payload.auto_save_history);
        assert_eq!(
            payload.additional_messages,
            AdditionalMessages::Converted(vec![UpstreamMessage {
                role: "user".into(),
                content: "hello".into(),
                content_type: "text",
            }])
        );
    }

    #[tokio::test]
    async fn forwards_caller_user_id_and_verbatim_messages() {
        let upstream = ScriptedUpstream::streaming(&[b"event:done\n\n"]);
        let body = r#"{"userId":"alice","additional_messages":[{"role":"user","content":"x","content_type":"text"}]}"#;
        app(upstream.clone()).oneshot(chat_request(body)).await.unwrap();

        let payload = upstream.last_payload.lock().await.clone().unwrap();
        assert_eq!(payload.user_id, "alice");
        assert_eq!(
            serde_json::to_value(&payload.additional_messages).unwrap(),
            json!([{"role":"user","content":"x","content_type":"text"}])
        );
    }

    #[tokio::test]
    async fn mid_stream_failure_ends_stream_without_sentinel() {
        let upstream = ScriptedUpstream::new(
            StatusCode::OK,
            vec![
                Chunk::Data(b"event:conversation.message.delta\ndata:{\"type\":\"answer\",\"content\":\"par\"}\n"),
                Chunk::Fail,
                Chunk::Data(b"event:done\n"),
            ],
        );
        let resp = app(upstream).oneshot(chat_request(HELLO)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "data: {\"content\":\"par\"}\n\n");
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn upstream_rejection_mirrors_status_and_body() {
        let upstream = ScriptedUpstream::new(
            StatusCode::UNAUTHORIZED,
            vec![Chunk::Data(br#"{"code":4100,"msg":"invalid token"}"#)],
        );
        let resp = app(upstream).oneshot(chat_request(HELLO)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers().get("content-type").unwrap(), "application/json");
        let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(
            body,
            json!({"error":"invalid token","details":{"code":4100,"msg":"invalid token"}})
        );
    }

    #[tokio::test]
    async fn upstream_text_rejection_is_carried_raw() {
        let upstream = ScriptedUpstream::new(
            StatusCode::BAD_GATEWAY,
            vec![Chunk::Data(b"<html>bad gateway</html>")],
        );
        let resp = app(upstream).oneshot(chat_request(HELLO)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body, json!({"error":"API Error: 502","details":"<html>bad gateway</html>"}));
    }

    #[tokio::test]
    async fn malformed_json_is_400_without_upstream_call() {
        let upstream = ScriptedUpstream::streaming(&[]);
        let resp = app(upstream.clone())
            .oneshot(chat_request("this is not json {{{"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body["error"], "Invalid Request");
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_message_lists_is_400_without_upstream_call() {
        let upstream = ScriptedUpstream::streaming(&[]);
        let resp = app(upstream.clone())
            .oneshot(chat_request(r#"{"userId":"bob"}"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transport_failure_is_500() {
        let resp = app(Arc::new(UnreachableUpstream)).oneshot(chat_request(HELLO)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body, json!({"error":"Internal Server Error"}));
    }

    // -----------------------------------------------------------------------
    // Front door
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn cors_preflight_allows_any_origin() {
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/api/chat")
            .header("origin", "http://example.test")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let resp = app(ScriptedUpstream::streaming(&[])).oneshot(req).await.unwrap();

        assert!(resp.status().is_success());
        assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");
    }

    #[tokio::test]
    async fn streaming_response_carries_cors_header() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("origin", "http://example.test")
            .header("content-type", "application/json")
            .body(Body::from(HELLO))
            .unwrap();
        let resp = app(ScriptedUpstream::streaming(&[b"event:done\n"])).oneshot(req).await.unwrap();

        assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");
    }

    #[tokio::test]
    async fn serves_static_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>chat</h1>").unwrap();

        let router = build_router(
            RelayService::new(ScriptedUpstream::streaming(&[]), "bot-test"),
            dir.path(),
        );
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "<h1>chat</h1>");
    }

    #[tokio::test]
    async fn missing_static_file_is_404() {
        let req = Request::builder().uri("/nope.js").body(Body::empty()).unwrap();
        let resp = app(ScriptedUpstream::streaming(&[])).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
