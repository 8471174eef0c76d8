//! Web router for the clinical assistant.
//!
//! Middleware stack (outermost → innermost):
//! 1. Cache-Control: no-store → 2. Access log → handler

use std::sync::Arc;

use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::workflow::CareWorkflow;

/// Build the router around a wired workflow.
///
/// Pages carry patient records, so no response may be cached.
pub fn care_router(workflow: Arc<CareWorkflow>) -> Router {
    let ctx = ApiContext::new(workflow);

    Router::new()
        .route("/", get(endpoints::patients::index))
        .route("/generate-plan", post(endpoints::plan::generate))
        .route(
            "/generate-education-material",
            post(endpoints::education::download),
        )
        .route("/health", get(endpoints::health::check))
        .with_state(ctx)
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}
