//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Exchanges
        .route(
            "/bots/{bot}/chats/{chat}/stream",
            post(handlers::chat::stream_chat),
        )
        .route(
            "/bots/{bot}/chats/{chat}/messages",
            post(handlers::chat::send_message),
        )
        .route(
            "/chats/{chat}",
            get(handlers::chat::get_chat).delete(handlers::chat::delete_chat),
        )
        .route("/chats/{chat}/cancel", post(handlers::chat::cancel_chat))
        // History
        .route(
            "/history",
            get(handlers::history::list_history).delete(handlers::history::clear_history),
        )
        // Limits and context
        .route("/bots/{bot}/limits", get(handlers::limits::get_limits))
        .route(
            "/bots/{bot}/context",
            get(handlers::context::get_context).put(handlers::context::update_context),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use palaver_core::llm::scripted::ScriptedProvider;

    use super::*;
    use crate::http::extractors::session::CLIENT_HEADER;
    use crate::state::test_config;

    #[tokio::test]
    async fn test_health_and_routing() {
        let dir = tempfile::tempdir().unwrap();
        let state =
            AppState::for_tests(dir.path(), ScriptedProvider::replying(&["Hi"]), test_config()).await;
        let router = build_router(state);

        let response = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(
                Request::post("/api/v1/bots/helper/chats/c1/messages")
                    .header("content-type", "application/json")
                    .header(CLIENT_HEADER, "tok-1")
                    .body(Body::from(r#"{"message":"hello"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(
                Request::get("/api/v1/chats/c1")
                    .header(CLIENT_HEADER, "tok-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["data"]["messages"][1]["content"], "Hi");
    }
}
