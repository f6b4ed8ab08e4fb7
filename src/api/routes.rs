use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Feature routes -- caller identity is derived from connection metadata
    let token_routes = Router::new()
        .route("/token/status", get(handlers::token_status))
        .route("/token/consume", post(handlers::consume_token))
        .route("/token/request", post(handlers::request_tokens));

    // Operator routes -- the review queue over the same store
    let admin_routes = Router::new()
        .route("/admin/requests", get(handlers::list_requests))
        .route("/admin/requests/:id/approve", post(handlers::approve_request))
        .route("/admin/requests/:id/reject", post(handlers::reject_request))
        .route("/admin/accounts", get(handlers::list_accounts));

    Router::new()
        .merge(token_routes)
        .merge(admin_routes)
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
