//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use log_relay::config::RelayConfig;
use log_relay::RunningRelay;
use serde_json::Value;
use tempfile::TempDir;

/// A relay on ephemeral ports with its log directories in a temp dir.
pub struct TestRelay {
    pub relay: RunningRelay,
    pub client: reqwest::Client,
    dir: TempDir,
}

impl TestRelay {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();

        let mut config = RelayConfig::default();
        config.server.bind_address = "127.0.0.1:0".into();
        config.socket.bind_address = "127.0.0.1:0".into();
        config.paths.services_dir = dir.path().join("services").display().to_string();
        config.paths.requests_dir = dir.path().join("requests").display().to_string();
        config.tail.poll_interval_ms = 20;

        let relay = log_relay::start(config).await.unwrap();
        Self {
            relay,
            client: reqwest::Client::new(),
            dir,
        }
    }

    pub fn api(&self, path: &str) -> String {
        format!("http://{}{}", self.relay.api_addr(), path)
    }

    pub fn ws(&self, path: &str) -> String {
        format!("ws://{}{}", self.relay.socket_addr(), path)
    }

    pub fn log_path(&self, namespace: &str, entity: &str) -> PathBuf {
        let sub = match namespace {
            "service" => "services",
            _ => "requests",
        };
        self.dir.path().join(sub).join(format!("{}.log", entity))
    }

    /// Contents of a sink file, empty if it does not exist.
    pub fn read_log(&self, namespace: &str, entity: &str) -> String {
        std::fs::read_to_string(self.log_path(namespace, entity)).unwrap_or_default()
    }

    pub async fn post_log(&self, service: &str, request: &str, level: &str, message: &str) -> reqwest::StatusCode {
        self.client
            .post(self.api("/v1/logs"))
            .json(&serde_json::json!({
                "service": service,
                "request": request,
                "level": level,
                "message": message,
            }))
            .send()
            .await
            .unwrap()
            .status()
    }

    pub async fn set_level(&self, service: &str, level: &str) {
        let res = self
            .client
            .put(self.api(&format!("/v1/config/levels/service/{}", service)))
            .json(&serde_json::json!({ "level": level }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
    }

    pub async fn stop(self) {
        self.relay.shutdown().await;
    }
}

/// Parse an envelope body.
pub async fn envelope(res: reqwest::Response) -> Value {
    res.json().await.unwrap()
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_until<F: Fn() -> bool>(check: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
