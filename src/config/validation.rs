//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, addresses parse)
//! - Detect conflicting sink directories
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{RelayConfig, TlsConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a loaded configuration for semantic errors.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "server.bind_address", &config.server.bind_address);
    check_address(&mut errors, "socket.bind_address", &config.socket.bind_address);
    check_tls(&mut errors, "server.tls", config.server.tls.as_ref());
    check_tls(&mut errors, "socket.tls", config.socket.tls.as_ref());

    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be greater than 0"));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new("server.max_body_bytes", "must be greater than 0"));
    }

    if config.paths.services_dir.trim().is_empty() {
        errors.push(ValidationError::new("paths.services_dir", "must not be empty"));
    }
    if config.paths.requests_dir.trim().is_empty() {
        errors.push(ValidationError::new("paths.requests_dir", "must not be empty"));
    }
    if config.paths.services_dir == config.paths.requests_dir {
        errors.push(ValidationError::new(
            "paths.requests_dir",
            "must differ from paths.services_dir",
        ));
    }

    if config.tail.poll_interval_ms == 0 {
        errors.push(ValidationError::new("tail.poll_interval_ms", "must be greater than 0"));
    }
    if config.tail.channel_capacity == 0 {
        errors.push(ValidationError::new("tail.channel_capacity", "must be greater than 0"));
    }
    if config.liveness.interval_secs == 0 {
        errors.push(ValidationError::new("liveness.interval_secs", "must be greater than 0"));
    }

    if let Some(path) = &config.store.path {
        if path.trim().is_empty() {
            errors.push(ValidationError::new("store.path", "must not be empty when set"));
        }
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}', expected 'pretty' or 'json'", other),
        )),
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{}' is not a valid socket address", value),
        ));
    }
}

fn check_tls(errors: &mut Vec<ValidationError>, field: &str, tls: Option<&TlsConfig>) {
    let Some(tls) = tls else { return };
    if tls.cert_path.trim().is_empty() {
        errors.push(ValidationError::new(format!("{}.cert_path", field), "must not be empty"));
    }
    if tls.key_path.trim().is_empty() {
        errors.push(ValidationError::new(format!("{}.key_path", field), "must not be empty"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RelayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = RelayConfig::default();
        config.server.bind_address = "not-an-address".into();
        config.paths.requests_dir = config.paths.services_dir.clone();
        config.tail.poll_interval_ms = 0;
        config.observability.log_format = "xml".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "server.bind_address",
                "paths.requests_dir",
                "tail.poll_interval_ms",
                "observability.log_format",
            ]
        );
    }

    #[test]
    fn test_tls_paths_required() {
        let mut config = RelayConfig::default();
        config.socket.tls = Some(TlsConfig {
            cert_path: "".into(),
            key_path: "key.pem".into(),
        });
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "socket.tls.cert_path: must not be empty");
    }
}
