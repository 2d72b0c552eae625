//! Periodic liveness sweep over all subscribers.
//!
//! # Responsibilities
//! - Tick every `liveness.interval_secs`
//! - Terminate subscribers that did not answer the previous ping
//! - Stop on the shutdown signal

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::config::LivenessConfig;
use crate::gateway::SubscriptionGateway;

pub struct LivenessSweep {
    gateway: Arc<SubscriptionGateway>,
    interval: Duration,
}

impl LivenessSweep {
    pub fn new(gateway: Arc<SubscriptionGateway>, config: &LivenessConfig) -> Self {
        Self {
            gateway,
            interval: Duration::from_secs(config.interval_secs),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Liveness sweep starting");

        // First tick one period out, so new subscribers get a full interval.
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.gateway.sweep_once();
                    if report.terminated > 0 {
                        tracing::info!(
                            probed = report.probed,
                            terminated = report.terminated,
                            "Terminated unresponsive subscribers"
                        );
                    } else {
                        tracing::debug!(probed = report.probed, "Liveness sweep");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Liveness sweep received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
