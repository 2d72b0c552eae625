//! Threshold configuration handlers.
//!
//! Every change is applied to already-open sinks before the response is sent.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::http::response::{ok, ApiResult, Envelope};
use crate::http::server::AppState;
use crate::severity::Severity;
use crate::store::{validate_upsert, StoreError, ThresholdRecord};

#[derive(Debug, Deserialize)]
pub struct UpsertBody {
    pub service: Option<String>,
    pub level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LevelBody {
    pub level: Option<String>,
}

type RecordResponse = ApiResult<Json<Envelope<ThresholdRecord>>>;

/// `GET /v1/config/levels/service`
pub async fn list_levels(
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<Vec<ThresholdRecord>>>> {
    let records = state.store.list_thresholds().await?;
    Ok(ok(records))
}

/// `POST /v1/config/levels/service`
pub async fn create_level(
    State(state): State<AppState>,
    body: Result<Json<UpsertBody>, JsonRejection>,
) -> RecordResponse {
    let Json(body) = body?;
    upsert(&state, body.service.as_deref(), body.level.as_deref()).await
}

/// `GET /v1/config/levels/service/{service}`
pub async fn get_level(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> RecordResponse {
    match state.store.get_threshold(&service).await? {
        Some(record) => Ok(ok(record)),
        None => Err(StoreError::NotFound(service).into()),
    }
}

/// `PUT /v1/config/levels/service/{service}`
pub async fn update_level(
    State(state): State<AppState>,
    Path(service): Path<String>,
    body: Result<Json<LevelBody>, JsonRejection>,
) -> RecordResponse {
    let Json(body) = body?;
    upsert(&state, Some(&service), body.level.as_deref()).await
}

/// `DELETE /v1/config/levels/service/{service}`
pub async fn delete_level(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> RecordResponse {
    let record = state.store.delete_threshold(&service).await?;
    state
        .registry
        .apply_threshold(&record.entity_name, Severity::default());
    Ok(ok(record))
}

async fn upsert(state: &AppState, service: Option<&str>, level: Option<&str>) -> RecordResponse {
    let (service, level) = validate_upsert(service, level)?;
    let record = state.store.upsert_threshold(&service, level).await?;
    state.registry.apply_threshold(&record.entity_name, record.level);
    Ok(ok(record))
}
