//! WebSocket feed client
//!
//! Connects to one upstream source, subscribes to the watched wallets and
//! forwards every text frame. Lost connections are retried with exponential
//! backoff and jitter; running out of attempts is fatal.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::health::SharedHealth;
use super::FeedEvent;
use crate::config::{FeedSourceConfig, ReconnectConfig};
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Subscription request sent after connecting
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionMessage {
    pub method: String,
    pub keys: Vec<String>,
}

/// Why a stream ended
#[derive(Debug)]
enum StreamEnd {
    Shutdown,
    Disconnected(String),
}

/// Backoff schedule for reconnecting; never gives up on its own, the
/// attempt limit is enforced by the caller
pub fn reconnect_backoff(config: &ReconnectConfig) -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(config.initial_delay_ms),
        current_interval: Duration::from_millis(config.initial_delay_ms),
        multiplier: config.multiplier,
        max_interval: Duration::from_millis(config.max_delay_ms),
        randomization_factor: config.randomization_factor,
        max_elapsed_time: None,
        ..Default::default()
    }
}

pub struct FeedClient {
    source: FeedSourceConfig,
    wallets: Vec<String>,
    reconnect: ReconnectConfig,
    health: SharedHealth,
    reconnect_requested: Arc<Notify>,
    event_tx: mpsc::Sender<FeedEvent>,
}

impl FeedClient {
    pub fn new(
        source: FeedSourceConfig,
        wallets: Vec<String>,
        reconnect: ReconnectConfig,
        health: SharedHealth,
        reconnect_requested: Arc<Notify>,
        event_tx: mpsc::Sender<FeedEvent>,
    ) -> Self {
        Self {
            source,
            wallets,
            reconnect,
            health,
            reconnect_requested,
            event_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.source.name
    }

    /// Connect, stream, and reconnect until shutdown. Returns
    /// [`Error::FeedExhausted`] once the attempt limit is used up.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let name = self.source.name.clone();
        let mut backoff = reconnect_backoff(&self.reconnect);
        let mut attempts = 0u32;

        info!(source = %name, url = %self.source.ws_url, "Starting feed client");

        loop {
            match self.connect().await {
                Ok(ws) => {
                    attempts = 0;
                    backoff.reset();
                    self.with_health(|h| h.record_connected(now()));
                    let _ = self.event_tx.send(FeedEvent::Connected { source: name.clone() }).await;

                    match self.stream(ws, &mut shutdown_rx).await {
                        StreamEnd::Shutdown => {
                            info!(source = %name, "Feed client shutting down");
                            return Ok(());
                        }
                        StreamEnd::Disconnected(reason) => {
                            warn!(source = %name, reason = %reason, "Feed disconnected");
                            let _ = self
                                .event_tx
                                .send(FeedEvent::Disconnected {
                                    source: name.clone(),
                                    reason,
                                })
                                .await;
                        }
                    }
                }
                Err(e) => {
                    error!(source = %name, error = %e, "Feed connection failed");
                }
            }

            attempts += 1;
            self.with_health(|h| h.record_disconnected(attempts));

            if attempts > self.reconnect.max_attempts {
                let err = Error::FeedExhausted {
                    source_name: name.clone(),
                    attempts: self.reconnect.max_attempts,
                };
                error!(source = %name, "Max reconnect attempts reached");
                let _ = self
                    .event_tx
                    .send(FeedEvent::Fatal {
                        source: name.clone(),
                        reason: err.to_string(),
                    })
                    .await;
                return Err(err);
            }

            let delay = backoff
                .next_backoff()
                .unwrap_or_else(|| Duration::from_millis(self.reconnect.max_delay_ms));
            warn!(source = %name, attempt = attempts, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown_rx.recv() => {
                    info!(source = %name, "Feed client shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn with_health(&self, f: impl FnOnce(&mut super::SourceHealth)) {
        let mut guard = self.health.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }

    async fn connect(&self) -> Result<WsStream> {
        let url = url::Url::parse(&self.source.ws_url)
            .map_err(|e| Error::Config(format!("Invalid WebSocket URL: {}", e)))?;

        let (mut ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::FeedConnection(format!("WebSocket connect failed: {}", e)))?;

        info!(source = %self.source.name, "Connected to feed");

        if !self.wallets.is_empty() {
            let msg = SubscriptionMessage {
                method: self.source.subscribe_method.clone(),
                keys: self.wallets.clone(),
            };
            let json = serde_json::to_string(&msg)?;
            ws.send(Message::Text(json))
                .await
                .map_err(|e| Error::FeedConnection(format!("Failed to subscribe: {}", e)))?;
            info!(source = %self.source.name, wallets = self.wallets.len(), "Subscribed to wallet activity");
        }

        Ok(ws)
    }

    async fn stream(&self, ws: WsStream, shutdown_rx: &mut broadcast::Receiver<()>) -> StreamEnd {
        let (mut write, mut read) = ws.split();

        let ping_interval = Duration::from_secs(self.source.ping_interval_secs);
        let mut ping_timer = tokio::time::interval(ping_interval);

        // A request stored while we were in backoff belongs to the old connection
        if self.reconnect_requested.notified().now_or_never().is_some() {
            debug!(source = %self.source.name, "Discarded stale reconnect request");
        }
        let reconnect = self.reconnect_requested.notified();
        tokio::pin!(reconnect);

        loop {
            tokio::select! {
                _ = ping_timer.tick() => {
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        return StreamEnd::Disconnected(format!("ping failed: {}", e));
                    }
                    debug!(source = %self.source.name, "Sent ping");
                }

                _ = &mut reconnect => {
                    let _ = write.send(Message::Close(None)).await;
                    return StreamEnd::Disconnected("health check requested reconnect".into());
                }

                _ = shutdown_rx.recv() => {
                    let _ = write.send(Message::Close(None)).await;
                    return StreamEnd::Shutdown;
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.with_health(|h| h.record_message(now()));
                            let event = FeedEvent::Message {
                                source: self.source.name.clone(),
                                text,
                            };
                            if self.event_tx.send(event).await.is_err() {
                                debug!("Feed event channel closed");
                                return StreamEnd::Shutdown;
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            debug!(source = %self.source.name, "Received pong");
                        }
                        Some(Ok(Message::Close(_))) => {
                            return StreamEnd::Disconnected("closed by server".into());
                        }
                        Some(Err(e)) => {
                            return StreamEnd::Disconnected(e.to_string());
                        }
                        None => {
                            return StreamEnd::Disconnected("stream ended".into());
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
