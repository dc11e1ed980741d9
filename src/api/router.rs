//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::pipeline::processor::DocumentProcessor;

/// Build the router. No authentication or rate limiting.
pub fn api_router(processor: Arc<DocumentProcessor>) -> Router {
    build_router(ApiContext::new(processor))
}

fn build_router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/query", post(endpoints::query::query))
        .route("/healthcheck", get(endpoints::health::check))
        .with_state(ctx)
        .layer(axum::middleware::from_fn(middleware::access_log::log_access))
}
