//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_entries_total` (counter): entries by namespace, level, outcome
//! - `relay_open_sinks` (gauge): open sinks by namespace
//! - `relay_active_watches` (gauge): live tail watches
//! - `relay_active_subscriptions` (gauge): active websocket subscribers
//! - `relay_subscriptions_terminated_total` (counter): teardowns by reason
//!
//! # Design Decisions
//! - Macros are no-ops until a recorder is installed, so tests need no setup
//! - Exporter is optional and bound to its own address

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::severity::Severity;
use crate::sinks::Namespace;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_entry(namespace: Namespace, level: Severity, outcome: &'static str) {
    metrics::counter!(
        "relay_entries_total",
        "namespace" => namespace.as_str(),
        "level" => level.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_sink_opened(namespace: Namespace) {
    metrics::gauge!("relay_open_sinks", "namespace" => namespace.as_str()).increment(1.0);
}

pub fn record_sink_closed(namespace: Namespace) {
    metrics::gauge!("relay_open_sinks", "namespace" => namespace.as_str()).decrement(1.0);
}

pub fn record_active_watches(count: usize) {
    metrics::gauge!("relay_active_watches").set(count as f64);
}

pub fn record_active_subscriptions(count: usize) {
    metrics::gauge!("relay_active_subscriptions").set(count as f64);
}

pub fn record_subscription_terminated(reason: &'static str) {
    metrics::counter!("relay_subscriptions_terminated_total", "reason" => reason).increment(1);
}
