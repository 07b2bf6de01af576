use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::status::StatusListKind;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut routes = Router::new()
        .route("/sessions", post(handlers::create_session))
        .route(
            "/sessions/:id",
            get(handlers::get_session).delete(handlers::revoke_session),
        )
        .route("/tokens", post(handlers::issue_token))
        .route("/tokens/:id", delete(handlers::revoke_token))
        .route(
            StatusListKind::Token.endpoint_path(),
            get(handlers::token_status_list),
        )
        .route(
            StatusListKind::Session.endpoint_path(),
            get(handlers::session_status_list),
        )
        .route(
            "/.well-known/openid-configuration",
            get(handlers::discovery),
        )
        .route("/_internal/health", get(handlers::health));

    // Test-only routes -- dangerous operations gated behind TEST_MODE
    if state.config.test_mode {
        tracing::warn!("Test mode enabled, purge route is available.");
        routes = routes.route("/admin/purge", delete(handlers::admin_purge));
    }

    routes.layer(TraceLayer::new_for_http()).with_state(state)
}
