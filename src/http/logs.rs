//! Log ingestion and sink lifecycle handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::severity::Severity;
use crate::sinks::Namespace;
use crate::store::{StoreError, MAX_ENTITY_NAME_LEN};

#[derive(Debug, Deserialize)]
pub struct LogEntryBody {
    pub service: Option<String>,
    pub request: Option<String>,
    pub message: Option<String>,
    pub level: Option<String>,
}

/// Required, non-empty, bounded string field.
fn required<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str, StoreError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => {
            if v.chars().count() > MAX_ENTITY_NAME_LEN {
                return Err(StoreError::TooLong {
                    field,
                    max: MAX_ENTITY_NAME_LEN,
                });
            }
            Ok(v)
        }
        _ => Err(StoreError::RequiredParameter(field)),
    }
}

/// `POST /v1/logs`
pub async fn post_log(
    State(state): State<AppState>,
    body: Result<Json<LogEntryBody>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(body) = body?;

    let service = required("service", &body.service)?;
    let request = required("request", &body.request)?;
    let message = body
        .message
        .as_deref()
        .ok_or(StoreError::RequiredParameter("message"))?;
    let level: Severity = body
        .level
        .as_deref()
        .ok_or(StoreError::RequiredParameter("level"))?
        .parse()?;

    state
        .dispatcher
        .log_entry(service, request, message, level)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn open(state: &AppState, namespace: Namespace, entity: &str) -> ApiResult<StatusCode> {
    state.registry.ensure_sink(namespace, entity).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn close(state: &AppState, namespace: Namespace, entity: &str) -> ApiResult<StatusCode> {
    state.registry.close_sink(namespace, entity).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/service/{service}/logger`
pub async fn open_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<StatusCode> {
    open(&state, Namespace::Service, &service).await
}

/// `DELETE /v1/service/{service}/logger`
pub async fn close_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<StatusCode> {
    close(&state, Namespace::Service, &service).await
}

/// `POST /v1/request/{request}/logger`
pub async fn open_request(
    State(state): State<AppState>,
    Path(request): Path<String>,
) -> ApiResult<StatusCode> {
    open(&state, Namespace::Request, &request).await
}

/// `DELETE /v1/request/{request}/logger`
pub async fn close_request(
    State(state): State<AppState>,
    Path(request): Path<String>,
) -> ApiResult<StatusCode> {
    close(&state, Namespace::Request, &request).await
}
