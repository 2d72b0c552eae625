//! HTTP router setup.
//!
//! # Responsibilities
//! - Build the REST API router (logs, sink lifecycle, threshold config)
//! - Build the websocket router served on the socket listener
//! - Wire up middleware (tracing, timeout, body limit, request ID)

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderName;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::gateway::SubscriptionGateway;
use crate::http::response::{ok, Envelope};
use crate::http::{levels, logs, websocket};
use crate::sinks::{Namespace, SinkRegistry};
use crate::store::ThresholdStore;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SinkRegistry>,
    pub dispatcher: Dispatcher,
    pub store: Arc<dyn ThresholdStore>,
    pub gateway: Arc<SubscriptionGateway>,
}

/// Build the REST API router with all middleware layers.
#[allow(deprecated)]
pub fn api_router(config: &ServerConfig, state: AppState) -> Router {
    let request_id = HeaderName::from_static(X_REQUEST_ID);

    Router::new()
        .route("/health", get(health))
        .route("/v1/logs", post(logs::post_log))
        .route(
            "/v1/service/{service}/logger",
            post(logs::open_service).delete(logs::close_service),
        )
        .route(
            "/v1/request/{request}/logger",
            post(logs::open_request).delete(logs::close_request),
        )
        .route(
            "/v1/config/levels/service",
            get(levels::list_levels).post(levels::create_level),
        )
        .route(
            "/v1/config/levels/service/{service}",
            get(levels::get_level)
                .put(levels::update_level)
                .delete(levels::delete_level),
        )
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

/// Build the websocket subscription router.
pub fn socket_router(state: AppState) -> Router {
    Router::new()
        .route("/service/{service}", get(websocket::subscribe_service))
        .route("/request/{request}", get(websocket::subscribe_request))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub open_service_sinks: usize,
    pub open_request_sinks: usize,
    pub active_subscriptions: usize,
}

/// `GET /health`
async fn health(State(state): State<AppState>) -> Json<Envelope<HealthStatus>> {
    ok(HealthStatus {
        status: "operational",
        version: env!("CARGO_PKG_VERSION"),
        open_service_sinks: state.registry.open_sinks(Namespace::Service).len(),
        open_request_sinks: state.registry.open_sinks(Namespace::Request).len(),
        active_subscriptions: state.gateway.active_connections(),
    })
}
