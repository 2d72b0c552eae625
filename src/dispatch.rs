//! Single entry point for log events.
//!
//! Every entry lands in two sinks: the service sink, tagged with the request
//! id, and the request sink, tagged with the service name. The two writes run
//! concurrently and fail independently.

use std::sync::Arc;

use thiserror::Error;

use crate::severity::Severity;
use crate::sinks::{Namespace, SinkError, SinkRegistry};

/// One or both sink writes failed.
#[derive(Debug, Error)]
#[error("log entry not fully written: {}", join_failures(.failures))]
pub struct DispatchError {
    pub failures: Vec<SinkError>,
}

fn join_failures(failures: &[SinkError]) -> String {
    failures
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl DispatchError {
    /// Kind of the first failure.
    pub fn kind(&self) -> &'static str {
        self.failures
            .first()
            .map(SinkError::kind)
            .unwrap_or("DispatchError")
    }

    /// Whether any failure was caused by the caller's input.
    pub fn is_validation(&self) -> bool {
        self.failures.iter().any(|e| match e {
            SinkError::InvalidEntityName { .. } => true,
            SinkError::Store(store) => store.is_validation(),
            _ => false,
        })
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<SinkRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SinkRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SinkRegistry> {
        &self.registry
    }

    /// Write one entry to its service sink and its request sink.
    ///
    /// Entries below a sink's threshold are dropped silently for that sink.
    pub async fn log_entry(
        &self,
        service: &str,
        request: &str,
        message: &str,
        level: Severity,
    ) -> Result<(), DispatchError> {
        let (service_result, request_result) = tokio::join!(
            self.registry
                .write(Namespace::Service, service, request, message, level),
            self.registry
                .write(Namespace::Request, request, service, message, level),
        );

        let failures: Vec<SinkError> = [service_result, request_result]
            .into_iter()
            .filter_map(Result::err)
            .collect();

        if failures.is_empty() {
            return Ok(());
        }

        for failure in &failures {
            tracing::warn!(
                service = %service,
                request = %request,
                error = %failure,
                "Log entry write failed"
            );
        }
        Err(DispatchError { failures })
    }
}
