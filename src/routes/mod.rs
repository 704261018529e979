pub mod api_routes;

use std::path::Path;

use axum::http::{header, Method};
use axum::routing::post;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::routes::api_routes::chat_handler;
use crate::service::relay_service::RelayService;

/// Wires the relay endpoint behind the front door: CORS, request tracing and
/// static files for everything that is not `/api/chat`.
pub fn build_router(relay: RelayService, static_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/api/chat", post(chat_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(relay)
}
