//! Per-source health bookkeeping and the periodic health check

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::HealthConfig;

pub type SharedHealth = Arc<Mutex<SourceHealth>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceHealth {
    pub healthy: bool,
    pub last_message_at: i64,
    pub consecutive_failures: u32,
    pub last_check_at: i64,
    pub reconnect_attempts: u32,
    pub messages_received: u64,
}

/// Result of a health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    Healthy,
    Reconnect,
}

impl SourceHealth {
    pub fn new(now: i64) -> Self {
        Self {
            healthy: false,
            last_message_at: now,
            last_check_at: now,
            ..Default::default()
        }
    }

    pub fn shared(now: i64) -> SharedHealth {
        Arc::new(Mutex::new(Self::new(now)))
    }

    pub fn record_message(&mut self, now: i64) {
        self.healthy = true;
        self.last_message_at = now;
        self.consecutive_failures = 0;
        self.messages_received += 1;
    }

    pub fn record_connected(&mut self, now: i64) {
        self.healthy = true;
        self.last_message_at = now;
        self.consecutive_failures = 0;
        self.reconnect_attempts = 0;
    }

    pub fn record_disconnected(&mut self, attempts: u32) {
        self.healthy = false;
        self.reconnect_attempts = attempts;
    }

    /// Mark the source unhealthy after `timeout_secs` of silence and decide
    /// whether to reconnect
    pub fn check(&mut self, now: i64, timeout_secs: u64, max_failures: u32) -> HealthVerdict {
        self.last_check_at = now;

        if now - self.last_message_at > timeout_secs as i64 {
            self.healthy = false;
            self.consecutive_failures += 1;
        }

        if !self.healthy || self.consecutive_failures >= max_failures {
            HealthVerdict::Reconnect
        } else {
            HealthVerdict::Healthy
        }
    }
}

/// Run the health check loop for one source; a failing check wakes the
/// feed client through `reconnect`
pub fn spawn_health_monitor(
    source: String,
    health: SharedHealth,
    reconnect: Arc<Notify>,
    config: HealthConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.check_interval_secs));
        // First tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = chrono::Utc::now().timestamp();
                    let (verdict, snapshot) = {
                        let mut guard = health.lock().unwrap_or_else(|e| e.into_inner());
                        let verdict = guard.check(now, config.source_timeout_secs, config.max_failures);
                        (verdict, guard.clone())
                    };

                    match verdict {
                        HealthVerdict::Healthy => {
                            debug!(source = %source, messages = snapshot.messages_received, "Source healthy");
                        }
                        HealthVerdict::Reconnect => {
                            warn!(
                                source = %source,
                                silent_secs = now - snapshot.last_message_at,
                                failures = snapshot.consecutive_failures,
                                "Source unhealthy, requesting reconnect"
                            );
                            reconnect.notify_one();
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(source = %source, "Health monitor shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_keeps_source_healthy() {
        let mut health = SourceHealth::new(0);
        health.record_message(100);
        assert_eq!(health.check(200, 300, 3), HealthVerdict::Healthy);
        assert_eq!(health.messages_received, 1);
        assert_eq!(health.last_check_at, 200);
    }

    #[test]
    fn test_silence_triggers_reconnect() {
        let mut health = SourceHealth::new(0);
        health.record_connected(0);

        assert_eq!(health.check(301, 300, 3), HealthVerdict::Reconnect);
        assert!(!health.healthy);
        assert_eq!(health.consecutive_failures, 1);

        health.record_message(350);
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.check(400, 300, 3), HealthVerdict::Healthy);
    }

    #[test]
    fn test_never_connected_is_unhealthy() {
        let mut health = SourceHealth::new(0);
        assert_eq!(health.check(10, 300, 3), HealthVerdict::Reconnect);
        assert_eq!(health.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_requests_reconnect() {
        let health = SourceHealth::shared(0);
        let reconnect = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = spawn_health_monitor(
            "primary".into(),
            health.clone(),
            reconnect.clone(),
            HealthConfig::default(),
            shutdown_rx,
        );

        // Never connected, so the first check asks for a reconnect
        tokio::time::timeout(Duration::from_secs(120), reconnect.notified())
            .await
            .expect("reconnect requested");

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
        assert!(health.lock().unwrap().last_check_at > 0);
    }
}
