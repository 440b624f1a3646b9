//! Signal performance tracking
//!
//! Each registered signal gets its own task that wakes at fixed offsets from
//! registration (3m through 24h), samples the price and records the change
//! relative to the signal's initial price. A horizon whose price lookup fails
//! is skipped; the task keeps going.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::market::MarketDataProvider;
use crate::notify::{format_performance_report, Notifier};
use crate::store::SignalStore;
use crate::types::{PerformanceRecord, Signal, Timeframe};

/// Running state of one tracked signal
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSignal {
    pub signal_id: String,
    pub token: String,
    pub confidence: f64,
    pub traders_count: usize,
    pub initial_price: f64,
    pub max_price: f64,
    pub min_price: f64,
    pub max_gain: f64,
    pub registered_at: i64,
    pub records: Vec<PerformanceRecord>,
}

impl TrackedSignal {
    fn from_signal(signal: &Signal, registered_at: i64) -> Self {
        Self {
            signal_id: signal.id.clone(),
            token: signal.token.clone(),
            confidence: signal.confidence,
            traders_count: signal.trader_count,
            initial_price: signal.initial_price,
            max_price: signal.initial_price,
            min_price: signal.initial_price,
            max_gain: 0.0,
            registered_at,
            records: Vec::new(),
        }
    }
}

fn percent_change(from: f64, to: f64) -> f64 {
    if from <= 0.0 {
        return 0.0;
    }
    let pct = (to - from) / from * 100.0;
    (pct * 10_000.0).round() / 10_000.0
}

pub struct PerformanceTracker {
    config: TrackerConfig,
    entries: DashMap<String, TrackedSignal>,
    market: Arc<dyn MarketDataProvider>,
    store: Arc<dyn SignalStore>,
    notifier: Arc<dyn Notifier>,
}

impl PerformanceTracker {
    pub fn new(
        config: TrackerConfig,
        market: Arc<dyn MarketDataProvider>,
        store: Arc<dyn SignalStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            market,
            store,
            notifier,
        }
    }

    /// Start tracking a signal. Returns the observation task, or `None`
    /// when tracking is disabled.
    pub fn register(self: &Arc<Self>, signal: &Signal, now: i64) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            return None;
        }

        self.entries
            .insert(signal.id.clone(), TrackedSignal::from_signal(signal, now));
        info!(
            signal_id = %signal.id,
            token = %signal.token,
            initial_price = signal.initial_price,
            "Tracking signal performance"
        );

        let tracker = Arc::clone(self);
        let signal_id = signal.id.clone();
        let token = signal.token.clone();
        Some(tokio::spawn(async move {
            tracker.run_horizons(signal_id, token, now).await;
        }))
    }

    async fn run_horizons(&self, signal_id: String, token: String, registered_at: i64) {
        let start = Instant::now();

        for timeframe in Timeframe::ALL {
            sleep_until(start + timeframe.offset()).await;

            if !self.entries.contains_key(&signal_id) {
                debug!(signal_id = %signal_id, "Tracking cancelled");
                return;
            }

            let price = match self.market.get_current_price(&token).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(
                        signal_id = %signal_id,
                        timeframe = %timeframe,
                        error = %e,
                        "Price unavailable, skipping horizon"
                    );
                    continue;
                }
            };

            let observed_at = registered_at + start.elapsed().as_secs() as i64;
            let record = match self.observe(&signal_id, timeframe, price, observed_at) {
                Some(record) => record,
                None => continue,
            };

            if let Err(e) = self.store.save_performance(&record).await {
                warn!(signal_id = %signal_id, error = %e, "Failed to save performance record");
            }

            if self.config.notify_reports {
                if let Err(e) = self.notifier.send_alert(&format_performance_report(&record)).await {
                    warn!(signal_id = %signal_id, error = %e, "Failed to send performance report");
                }
            }
        }

        if let Some((_, tracked)) = self.entries.remove(&signal_id) {
            info!(
                signal_id = %signal_id,
                token = %tracked.token,
                max_gain = tracked.max_gain,
                horizons = tracked.records.len(),
                "Tracking complete"
            );
        }
    }

    /// Record a price observation for one horizon. Returns `None` if the
    /// signal is not tracked or the horizon was already recorded.
    pub fn observe(
        &self,
        signal_id: &str,
        timeframe: Timeframe,
        price: f64,
        observed_at: i64,
    ) -> Option<PerformanceRecord> {
        let mut entry = self.entries.get_mut(signal_id)?;
        let tracked = entry.value_mut();

        if tracked.records.iter().any(|r| r.timeframe == timeframe) {
            return None;
        }

        tracked.max_price = tracked.max_price.max(price);
        tracked.min_price = tracked.min_price.min(price);
        tracked.max_gain = percent_change(tracked.initial_price, tracked.max_price);

        let record = PerformanceRecord {
            signal_id: tracked.signal_id.clone(),
            token: tracked.token.clone(),
            timeframe,
            price,
            percent_change: percent_change(tracked.initial_price, price),
            max_gain: tracked.max_gain,
            confidence: tracked.confidence,
            traders_count: tracked.traders_count,
            observed_at,
        };
        tracked.records.push(record.clone());

        debug!(
            signal_id,
            timeframe = %timeframe,
            percent_change = record.percent_change,
            "Performance observed"
        );
        Some(record)
    }

    pub fn remove(&self, signal_id: &str) -> Option<TrackedSignal> {
        self.entries.remove(signal_id).map(|(_, tracked)| tracked)
    }

    pub fn snapshot(&self, signal_id: &str) -> Option<TrackedSignal> {
        self.entries.get(signal_id).map(|e| e.value().clone())
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::notify::LogNotifier;
    use crate::store::MemoryStore;
    use crate::types::{SignalLevel, TokenMetrics, TokenType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns prices from a script, one per call; `None` entries fail
    struct ScriptedPrices {
        prices: Vec<Option<f64>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for ScriptedPrices {
        async fn get_token_metrics(&self, token: &str) -> Result<TokenMetrics> {
            Err(Error::market_data(token, "unused"))
        }

        async fn get_current_price(&self, token: &str) -> Result<f64> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            self.prices
                .get(i)
                .copied()
                .flatten()
                .ok_or_else(|| Error::market_data(token, "no price"))
        }
    }

    fn signal(id: &str, initial_price: f64) -> Signal {
        Signal {
            id: id.into(),
            token: "T1".into(),
            confidence: 0.75,
            rule_confidence: 0.75,
            ml_probability: None,
            level: SignalLevel::B,
            trader_count: 3,
            traders: vec![],
            high_quality_traders: 2,
            elite_traders: 1,
            initial_price,
            market_cap: 0.0,
            volume_1h: 0.0,
            usd_total: 900.0,
            buys: 3,
            sells: 0,
            token_type: TokenType::Unknown,
            whale_activity: false,
            created_at: 0,
        }
    }

    fn tracker(prices: Vec<Option<f64>>, store: Arc<MemoryStore>) -> Arc<PerformanceTracker> {
        Arc::new(PerformanceTracker::new(
            TrackerConfig {
                enabled: true,
                notify_reports: false,
            },
            Arc::new(ScriptedPrices {
                prices,
                calls: AtomicUsize::new(0),
            }),
            store,
            Arc::new(LogNotifier),
        ))
    }

    #[test]
    fn test_observe_percent_change_and_max_gain() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(vec![], store);
        tracker
            .entries
            .insert("S1".into(), TrackedSignal::from_signal(&signal("S1", 1.0), 0));

        let record = tracker.observe("S1", Timeframe::M3, 1.2, 180).unwrap();
        assert_eq!(record.percent_change, 20.0);
        assert_eq!(record.max_gain, 20.0);

        let record = tracker.observe("S1", Timeframe::M5, 0.9, 300).unwrap();
        assert_eq!(record.percent_change, -10.0);
        assert_eq!(record.max_gain, 20.0);

        // Same horizon twice is ignored
        assert!(tracker.observe("S1", Timeframe::M5, 2.0, 301).is_none());

        let tracked = tracker.snapshot("S1").unwrap();
        assert_eq!(tracked.min_price, 0.9);
        assert_eq!(tracked.records.len(), 2);
    }

    #[test]
    fn test_zero_initial_price() {
        assert_eq!(percent_change(0.0, 5.0), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_skips_failed_horizon() {
        let store = Arc::new(MemoryStore::new());
        let prices = vec![Some(1.2), None, Some(1.5), Some(1.1), Some(0.8), Some(1.0), Some(1.0), Some(1.3)];
        let tracker = tracker(prices, store.clone());

        let handle = tracker.register(&signal("S1", 1.0), 0).unwrap();
        assert_eq!(tracker.active_count(), 1);
        handle.await.unwrap();

        let records = store.performance("S1");
        assert_eq!(records.len(), 7);
        assert_eq!(records[0].timeframe, Timeframe::M3);
        assert_eq!(records[0].percent_change, 20.0);
        assert_eq!(records[0].observed_at, 180);
        assert!(records.iter().all(|r| r.timeframe != Timeframe::M5));
        assert_eq!(records.last().unwrap().max_gain, 50.0);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_signal_stops() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(vec![Some(1.1); 8], store.clone());

        let handle = tracker.register(&signal("S1", 1.0), 0).unwrap();
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(tracker.remove("S1").is_some());
        handle.await.unwrap();

        assert_eq!(store.performance("S1").len(), 1);
    }
}
