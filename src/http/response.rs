//! Response envelope and error mapping.
//!
//! # Responsibilities
//! - Wrap every JSON payload as `{"data": ..., "errors": [...]}`
//! - Map domain errors to HTTP status codes
//!
//! # Design Decisions
//! - Caller input problems → 400, missing records → 404, everything else → 500
//! - The error `type` is the domain error's stable kind string

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::dispatch::DispatchError;
use crate::severity::SeverityError;
use crate::sinks::SinkError;
use crate::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// JSON body of every API response.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
    pub errors: Vec<ErrorBody>,
}

/// Successful envelope.
pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        data: Some(data),
        errors: Vec::new(),
    })
}

/// Error returned from a handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.kind(), e.to_string())
    }
}

impl From<SinkError> for ApiError {
    fn from(e: SinkError) -> Self {
        match e {
            SinkError::Store(store) => store.into(),
            other => {
                let status = if matches!(other, SinkError::InvalidEntityName { .. }) {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                Self::new(status, other.kind(), other.to_string())
            }
        }
    }
}

impl From<SeverityError> for ApiError {
    fn from(e: SeverityError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.kind(), e.to_string())
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        let status = if e.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, e.kind(), e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidBodyError", e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(kind = self.kind, error = %self.message, "Request failed");
        } else {
            tracing::debug!(kind = self.kind, error = %self.message, "Request rejected");
        }

        let body = Envelope::<()> {
            data: None,
            errors: vec![ErrorBody {
                kind: self.kind.to_string(),
                message: self.message,
            }],
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
