//! Signal engine
//!
//! Owns intake, aggregation, reputation, emission and tracking, and runs the
//! long-lived loops. Feed clients live outside the engine and hand it
//! [`FeedEvent`]s through a channel.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::aggregator::{AddOutcome, Aggregator};
use crate::config::Config;
use crate::emitter::{CycleReport, SafetyOracle, SignalEmitter, SuccessEstimator};
use crate::error::{Error, Result};
use crate::feed::FeedEvent;
use crate::intake::{Intake, IntakeSnapshot};
use crate::market::MarketDataProvider;
use crate::notify::{format_fatal, Notifier};
use crate::reputation::{ReputationBackend, ReputationStore};
use crate::store::SignalStore;
use crate::tracker::PerformanceTracker;

/// External services the engine talks to
pub struct Collaborators {
    pub market: Arc<dyn MarketDataProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub store: Arc<dyn SignalStore>,
    pub reputation: Arc<dyn ReputationBackend>,
    pub safety: Option<Arc<dyn SafetyOracle>>,
    pub estimator: Option<Arc<dyn SuccessEstimator>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub intake: IntakeSnapshot,
    pub active_candidates: usize,
    pub tracked_signals: usize,
    pub signals_last_hour: usize,
}

pub struct SignalEngine {
    config: Config,
    intake: Intake,
    aggregator: Arc<Mutex<Aggregator>>,
    reputation: Arc<ReputationStore>,
    emitter: SignalEmitter,
    tracker: Option<Arc<PerformanceTracker>>,
    notifier: Arc<dyn Notifier>,
}

impl SignalEngine {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let aggregator = Arc::new(Mutex::new(Aggregator::new(config.aggregator.clone())));
        let reputation = Arc::new(ReputationStore::new(
            config.reputation.clone(),
            collaborators.reputation,
        ));

        let tracker = config.tracker.enabled.then(|| {
            Arc::new(PerformanceTracker::new(
                config.tracker.clone(),
                collaborators.market.clone(),
                collaborators.store.clone(),
                collaborators.notifier.clone(),
            ))
        });

        let mut emitter = SignalEmitter::new(
            &config,
            aggregator.clone(),
            reputation.clone(),
            collaborators.market,
            collaborators.notifier.clone(),
            collaborators.store,
        );
        if let Some(tracker) = &tracker {
            emitter = emitter.with_tracker(tracker.clone());
        }
        if let Some(safety) = collaborators.safety {
            emitter = emitter.with_safety_oracle(safety);
        }
        if let Some(estimator) = collaborators.estimator {
            emitter = emitter.with_estimator(estimator);
        }

        Self {
            intake: Intake::new(&config.intake),
            aggregator,
            reputation,
            emitter,
            tracker,
            notifier: collaborators.notifier,
            config,
        }
    }

    /// Parse, normalize, dedup, update reputation and aggregate one frame.
    /// Returns `None` when the frame was rejected or a duplicate.
    pub async fn handle_message(&self, source: &str, text: &str, now: i64) -> Option<AddOutcome> {
        let event = self.intake.process(text, source, now)?;

        let outcome = self.aggregator.lock().await.add_transaction(&event, now);
        // Trades on cooling-down or flagged tokens earn the wallet nothing
        if matches!(outcome, AddOutcome::Created | AddOutcome::Updated) {
            self.reputation
                .update_score_on_trade(&event.wallet, event.tx_type)
                .await;
        }
        debug!(
            wallet = %event.wallet,
            token = %event.token,
            tx_type = %event.tx_type,
            amount_usd = event.amount_usd,
            outcome = ?outcome,
            "Transaction aggregated"
        );
        Some(outcome)
    }

    /// Run one emitter cycle
    pub async fn evaluate(&self, now: i64) -> CycleReport {
        self.emitter.evaluate(now).await
    }

    pub async fn status(&self, now: i64) -> EngineStatus {
        EngineStatus {
            intake: self.intake.stats(),
            active_candidates: self.aggregator.lock().await.active_count(),
            tracked_signals: self.tracker.as_ref().map(|t| t.active_count()).unwrap_or(0),
            signals_last_hour: self.emitter.signals_last_hour(now),
        }
    }

    pub fn aggregator(&self) -> &Arc<Mutex<Aggregator>> {
        &self.aggregator
    }

    pub fn reputation(&self) -> &Arc<ReputationStore> {
        &self.reputation
    }

    pub fn tracker(&self) -> Option<&Arc<PerformanceTracker>> {
        self.tracker.as_ref()
    }

    /// Run until the feed channel closes, shutdown is signalled, or a feed
    /// reports a fatal error. All periodic tasks are stopped and awaited
    /// before returning; tracker tasks are left to the runtime.
    pub async fn run(
        self: Arc<Self>,
        feed_rx: mpsc::Receiver<FeedEvent>,
        shutdown: broadcast::Sender<()>,
    ) -> Result<()> {
        info!(
            poll_interval_secs = self.config.signal.poll_interval_secs,
            signal_window_secs = self.config.signal.signal_window_secs,
            max_signals_per_hour = self.config.signal.max_signals_per_hour,
            "Signal engine starting"
        );

        let periodic = vec![
            self.clone().spawn_evaluation_loop(shutdown.subscribe()),
            self.clone().spawn_dedup_sweep(shutdown.subscribe()),
            self.clone().spawn_aggregator_sweep(shutdown.subscribe()),
        ];

        let consumer = {
            let engine = self.clone();
            let shutdown_rx = shutdown.subscribe();
            tokio::spawn(async move { engine.consume(feed_rx, shutdown_rx).await })
        };

        let result = match consumer.await {
            Ok(result) => result,
            Err(e) => Err(Error::Internal(format!("feed consumer panicked: {}", e))),
        };

        let _ = shutdown.send(());
        for task in periodic {
            let _ = task.await;
        }

        let status = self.status(now()).await;
        info!(
            accepted = status.intake.accepted,
            duplicates = status.intake.duplicate,
            active_candidates = status.active_candidates,
            "Signal engine stopped"
        );
        result
    }

    async fn consume(
        &self,
        mut feed_rx: mpsc::Receiver<FeedEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                event = feed_rx.recv() => {
                    match event {
                        Some(FeedEvent::Message { source, text }) => {
                            self.handle_message(&source, &text, now()).await;
                        }
                        Some(FeedEvent::Connected { source }) => {
                            info!(source = %source, "Feed connected");
                        }
                        Some(FeedEvent::Disconnected { source, reason }) => {
                            warn!(source = %source, reason = %reason, "Feed disconnected");
                        }
                        Some(FeedEvent::Fatal { source, reason }) => {
                            error!(source = %source, reason = %reason, "Feed lost for good");
                            if let Err(e) = self.notifier.send_alert(&format_fatal(&source, &reason)).await {
                                warn!(error = %e, "Failed to announce fatal feed error");
                            }
                            return Err(Error::FeedExhausted {
                                source_name: source,
                                attempts: self.config.reconnect.max_attempts,
                            });
                        }
                        None => {
                            info!("Feed channel closed");
                            return Ok(());
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    return Ok(());
                }
            }
        }
    }

    fn spawn_evaluation_loop(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.signal.poll_interval());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = now();
                        self.evaluate(now).await;
                        let status = self.status(now).await;
                        debug!(
                            active_candidates = status.active_candidates,
                            tracked_signals = status.tracked_signals,
                            signals_last_hour = status.signals_last_hour,
                            accepted = status.intake.accepted,
                            "Engine status"
                        );
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Evaluation loop shutting down");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_dedup_sweep(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(self.config.intake.dedup_cleanup_interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.intake.dedup().cleanup(now());
                        if removed > 0 {
                            debug!(removed, remaining = self.intake.dedup().len(), "Dedup sweep");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }

    fn spawn_aggregator_sweep(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(self.config.aggregator.cleanup_interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.aggregator.lock().await.cleanup(now());
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::notify::LogNotifier;
    use crate::store::MemoryStore;
    use crate::types::TokenMetrics;
    use async_trait::async_trait;

    struct NoMarket;

    #[async_trait]
    impl MarketDataProvider for NoMarket {
        async fn get_token_metrics(&self, token: &str) -> Result<TokenMetrics> {
            Err(Error::market_data(token, "offline"))
        }

        async fn get_current_price(&self, token: &str) -> Result<f64> {
            Err(Error::market_data(token, "offline"))
        }
    }

    fn engine(store: Arc<MemoryStore>) -> SignalEngine {
        SignalEngine::new(
            Config::default(),
            Collaborators {
                market: Arc::new(NoMarket),
                notifier: Arc::new(LogNotifier),
                store: store.clone(),
                reputation: store,
                safety: None,
                estimator: None,
            },
        )
    }

    #[tokio::test]
    async fn test_handle_message_pipeline() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let buy = r#"{"wallet":"W1","token":"T1","type":"BUY","amount_usd":300}"#;

        assert_eq!(engine.handle_message("primary", buy, 1000).await, Some(AddOutcome::Created));
        // Same transaction from the second feed
        assert_eq!(engine.handle_message("backup", buy, 1001).await, None);
        assert_eq!(engine.handle_message("primary", "not json", 1002).await, None);

        let status = engine.status(1002).await;
        assert_eq!(status.intake.accepted, 1);
        assert_eq!(status.intake.duplicate, 1);
        assert_eq!(status.intake.rejected_malformed, 1);
        assert_eq!(status.active_candidates, 1);

        // Reputation nudged and written through once
        assert!((store.wallet_score("W1").unwrap() - 5.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ignored_trade_leaves_reputation_alone() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        engine.aggregator().lock().await.mark_failed("T9", 1000);

        let buy = r#"{"wallet":"W1","token":"T9","type":"BUY","amount_usd":300}"#;
        assert_eq!(
            engine.handle_message("primary", buy, 1000).await,
            Some(AddOutcome::IgnoredFailed)
        );
        assert!(store.wallet_score("W1").is_none());
    }

    #[tokio::test]
    async fn test_run_stops_on_channel_close() {
        let engine = Arc::new(engine(Arc::new(MemoryStore::new())));
        let (feed_tx, feed_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);

        feed_tx
            .send(FeedEvent::Message {
                source: "primary".into(),
                text: r#"{"wallet":"W1","token":"T1","type":"BUY","amount_usd":300}"#.into(),
            })
            .await
            .unwrap();
        drop(feed_tx);

        engine.clone().run(feed_rx, shutdown_tx).await.unwrap();
        assert_eq!(engine.status(now()).await.intake.accepted, 1);
    }

    #[tokio::test]
    async fn test_fatal_feed_event_stops_engine() {
        let engine = Arc::new(engine(Arc::new(MemoryStore::new())));
        let (feed_tx, feed_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);

        feed_tx
            .send(FeedEvent::Fatal {
                source: "primary".into(),
                reason: "exhausted".into(),
            })
            .await
            .unwrap();

        let err = engine.run(feed_rx, shutdown_tx).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
