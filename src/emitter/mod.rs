//! Signal emitter
//!
//! Every poll interval the emitter walks the candidates, highest priority
//! first, and runs each through the qualification gates:
//!
//! 1. Window age and trader count
//! 2. Recent activity in the tail of the window
//! 3. Hourly volume
//! 4. Five-minute volume growth
//! 5. Trader quality
//! 6. Confidence (rules, optionally blended with the estimator)
//! 7. Safety (failed-token registry, then the oracle)
//!
//! A candidate that clears every gate becomes a [`Signal`] unless the hourly
//! cap has been reached.

pub mod features;
pub mod signal_id;
pub mod throttle;

pub use features::{build_features, FeatureMap, ScoreSummary, SuccessEstimator};
pub use signal_id::signal_id;
pub use throttle::HourlyThrottle;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::aggregator::{Aggregator, TokenCandidate};
use crate::config::{Config, ScoringConfig, SignalConfig};
use crate::error::Result;
use crate::market::MarketDataProvider;
use crate::notify::{format_signal_alert, Notifier};
use crate::reputation::ReputationStore;
use crate::scoring::{compute_confidence, detect_whale_activity, ConfidenceInputs};
use crate::store::SignalStore;
use crate::tracker::PerformanceTracker;
use crate::types::{Signal, SignalLevel, TokenMetrics, TokenType};

/// Token safety check (rug / honeypot screening)
#[async_trait]
pub trait SafetyOracle: Send + Sync {
    async fn is_token_safe(&self, token: &str, min_score: f64) -> Result<bool>;
}

/// Why a candidate did not become a signal this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    AlreadyHandled,
    WindowTooShort,
    TooFewTraders,
    NoRecentActivity,
    MarketDataUnavailable,
    LowVolume,
    LowGrowth,
    NoQualityTraders,
    LowConfidence,
    PreviouslyFailed,
    Unsafe,
    SafetyUnavailable,
}

/// Outcome of one evaluation cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub evaluated: usize,
    pub filtered: BTreeMap<FilterReason, usize>,
    pub signals: Vec<Signal>,
    /// The hourly cap stopped the cycle
    pub throttled: bool,
}

impl CycleReport {
    fn filter(&mut self, reason: FilterReason) {
        *self.filtered.entry(reason).or_insert(0) += 1;
    }

    pub fn filtered_by(&self, reason: FilterReason) -> usize {
        self.filtered.get(&reason).copied().unwrap_or(0)
    }

    pub fn signaled(&self) -> usize {
        self.signals.len()
    }
}

/// A candidate that passed every gate
struct Qualified {
    candidate: TokenCandidate,
    metrics: TokenMetrics,
    summary: ScoreSummary,
    token_type: TokenType,
    whale_activity: bool,
    rule_confidence: f64,
    ml_probability: Option<f64>,
    confidence: f64,
}

pub struct SignalEmitter {
    signal_config: SignalConfig,
    scoring_config: ScoringConfig,
    failed_token_ttl_secs: i64,
    aggregator: Arc<Mutex<Aggregator>>,
    reputation: Arc<ReputationStore>,
    market: Arc<dyn MarketDataProvider>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn SignalStore>,
    tracker: Option<Arc<PerformanceTracker>>,
    safety: Option<Arc<dyn SafetyOracle>>,
    estimator: Option<Arc<dyn SuccessEstimator>>,
    throttle: StdMutex<HourlyThrottle>,
}

impl SignalEmitter {
    pub fn new(
        config: &Config,
        aggregator: Arc<Mutex<Aggregator>>,
        reputation: Arc<ReputationStore>,
        market: Arc<dyn MarketDataProvider>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn SignalStore>,
    ) -> Self {
        Self {
            signal_config: config.signal.clone(),
            scoring_config: config.scoring.clone(),
            failed_token_ttl_secs: config.aggregator.failed_token_ttl_secs as i64,
            aggregator,
            reputation,
            market,
            notifier,
            store,
            tracker: None,
            safety: None,
            estimator: None,
            throttle: StdMutex::new(HourlyThrottle::new(config.signal.max_signals_per_hour)),
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<PerformanceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_safety_oracle(mut self, oracle: Arc<dyn SafetyOracle>) -> Self {
        self.safety = Some(oracle);
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn SuccessEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    fn at_cap(&self, now: i64) -> bool {
        self.throttle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_at_cap(now)
    }

    /// Signals emitted within the trailing hour
    pub fn signals_last_hour(&self, now: i64) -> usize {
        let mut throttle = self.throttle.lock().unwrap_or_else(|e| e.into_inner());
        throttle.prune(now);
        throttle.count()
    }

    /// Run one evaluation cycle
    pub async fn evaluate(&self, now: i64) -> CycleReport {
        let mut report = CycleReport::default();

        if self.at_cap(now) {
            info!(cap = self.signal_config.max_signals_per_hour, "Hourly signal cap reached, waiting");
            report.throttled = true;
            return report;
        }

        let candidates = self.aggregator.lock().await.ranked_candidates();

        for candidate in candidates {
            report.evaluated += 1;

            {
                let mut aggregator = self.aggregator.lock().await;
                if aggregator.is_signaled(&candidate.token, now) || aggregator.is_failed(&candidate.token, now) {
                    report.filter(FilterReason::AlreadyHandled);
                    continue;
                }
            }

            let qualified = match self.qualify(candidate, now).await {
                Ok(q) => q,
                Err(reason) => {
                    report.filter(reason);
                    continue;
                }
            };

            if self.at_cap(now) {
                info!(token = %qualified.candidate.token, "Hourly signal cap reached mid-cycle");
                report.throttled = true;
                break;
            }

            let signal = self.emit(qualified, now).await;
            report.signals.push(signal);
        }

        if report.evaluated > 0 {
            info!(
                evaluated = report.evaluated,
                signaled = report.signaled(),
                filtered = ?report.filtered,
                throttled = report.throttled,
                "Evaluation cycle complete"
            );
        }

        report
    }

    async fn qualify(&self, candidate: TokenCandidate, now: i64) -> std::result::Result<Qualified, FilterReason> {
        let cfg = &self.signal_config;
        let token = candidate.token.clone();

        // 1. window and traders
        let trader_count = candidate.trader_count();
        if candidate.age(now) < cfg.signal_window_secs as i64 {
            return Err(FilterReason::WindowTooShort);
        }
        if trader_count < cfg.min_traders {
            return Err(FilterReason::TooFewTraders);
        }

        // 2. recent activity
        let recent_window = (cfg.signal_window_secs as f64 * cfg.recent_activity_fraction) as i64;
        if candidate.recent_transactions(now - recent_window) < cfg.min_recent_transactions {
            debug!(token = %token, "Filtered: no recent activity");
            return Err(FilterReason::NoRecentActivity);
        }

        // 3. volume
        let metrics = match self.market.get_token_metrics(&token).await {
            Ok(m) => m,
            Err(e) => {
                warn!(token = %token, error = %e, "Market data unavailable, skipping");
                return Err(FilterReason::MarketDataUnavailable);
            }
        };
        if metrics.volume_1h < cfg.min_volume_usd {
            debug!(token = %token, volume_1h = metrics.volume_1h, "Filtered: low volume");
            return Err(FilterReason::LowVolume);
        }

        // 4. growth
        if metrics.volume_growth_5m < cfg.min_volume_growth_5m {
            debug!(token = %token, growth_5m = metrics.volume_growth_5m, "Filtered: low growth");
            return Err(FilterReason::LowGrowth);
        }

        // 5. trader quality
        let scores = self.reputation.scores_for(&candidate.traders, now).await;
        let summary = ScoreSummary::from_scores(&scores, cfg.high_quality_score);
        if summary.high_quality == 0 && trader_count < cfg.min_traders_without_quality {
            debug!(token = %token, "Filtered: no quality traders");
            return Err(FilterReason::NoQualityTraders);
        }

        // 6. confidence
        let token_type = metrics.token_type.unwrap_or_default();
        let whale = detect_whale_activity(
            &candidate.transactions,
            metrics.market_cap,
            metrics.volume_1h,
            self.scoring_config.min_whale_usd,
        );
        let rule_confidence = compute_confidence(
            &ConfidenceInputs {
                scores: &scores,
                volume_1h: metrics.volume_1h,
                market_cap: metrics.market_cap,
                volume_growth_5m: metrics.volume_growth_5m,
                token_type,
                whale_activity: whale.has_whale_activity,
            },
            &self.scoring_config,
        );

        let mut ml_probability = None;
        let mut confidence = rule_confidence;
        if let Some(estimator) = &self.estimator {
            let features = build_features(&candidate, &metrics, &summary, whale.has_whale_activity, rule_confidence, now);
            match estimator.predict_success(&features).await {
                Ok(p) => {
                    let p = p.clamp(0.0, 1.0);
                    let weight = cfg.ml_weight.clamp(0.0, 1.0);
                    confidence = (rule_confidence * (1.0 - weight) + p * weight).clamp(0.0, 1.0);
                    ml_probability = Some(p);
                }
                Err(e) => warn!(token = %token, error = %e, "Success estimator failed, using rule confidence"),
            }
        }

        if confidence < cfg.min_confidence {
            debug!(token = %token, confidence, "Filtered: low confidence");
            return Err(FilterReason::LowConfidence);
        }

        // 7. safety
        self.check_safety(&token, now).await?;

        Ok(Qualified {
            candidate,
            metrics,
            summary,
            token_type,
            whale_activity: whale.has_whale_activity,
            rule_confidence,
            ml_probability,
            confidence,
        })
    }

    async fn check_safety(&self, token: &str, now: i64) -> std::result::Result<(), FilterReason> {
        match self.store.get_failed_token(token).await {
            Ok(Some(flagged_at)) if now - flagged_at < self.failed_token_ttl_secs => {
                self.aggregator.lock().await.mark_failed(token, flagged_at);
                return Err(FilterReason::PreviouslyFailed);
            }
            Ok(_) => {}
            Err(e) => warn!(token, error = %e, "Failed-token lookup failed"),
        }

        let oracle = match &self.safety {
            Some(oracle) => oracle,
            None => return Ok(()),
        };

        match oracle.is_token_safe(token, self.signal_config.safety_min_score).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!(token, "Token failed safety check, ignoring for 24h");
                self.aggregator.lock().await.mark_failed(token, now);
                if let Err(e) = self.store.save_failed_token(token, "failed safety check", now).await {
                    warn!(token, error = %e, "Failed to persist failed token");
                }
                Err(FilterReason::Unsafe)
            }
            Err(e) => {
                warn!(token, error = %e, "Safety oracle unavailable, retrying next cycle");
                Err(FilterReason::SafetyUnavailable)
            }
        }
    }

    async fn emit(&self, q: Qualified, now: i64) -> Signal {
        let candidate = q.candidate;
        let signal = Signal {
            id: signal_id(&candidate.token, now),
            token: candidate.token.clone(),
            confidence: q.confidence,
            rule_confidence: q.rule_confidence,
            ml_probability: q.ml_probability,
            level: SignalLevel::from_confidence(q.confidence),
            trader_count: candidate.trader_count(),
            traders: candidate.traders.iter().cloned().collect(),
            high_quality_traders: q.summary.high_quality,
            elite_traders: q.summary.elite,
            initial_price: q.metrics.price,
            market_cap: q.metrics.market_cap,
            volume_1h: q.metrics.volume_1h,
            usd_total: candidate.usd_total,
            buys: candidate.buys,
            sells: candidate.sells,
            token_type: q.token_type,
            whale_activity: q.whale_activity,
            created_at: now,
        };

        self.aggregator.lock().await.mark_signaled(&signal.token, now);
        self.throttle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(&signal.token, now);

        info!(
            signal_id = %signal.id,
            token = %signal.token,
            confidence = signal.confidence,
            level = %signal.level,
            traders = signal.trader_count,
            "Signal emitted"
        );

        // Delivery may retry for a while, it must not hold up the cycle
        let notifier = self.notifier.clone();
        let alert = format_signal_alert(&signal);
        let signal_id = signal.id.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send_alert(&alert).await {
                warn!(signal_id = %signal_id, error = %e, "Failed to deliver signal alert");
            }
        });

        if let Err(e) = self.store.save_signal(&signal).await {
            warn!(signal_id = %signal.id, error = %e, "Failed to save signal");
        }

        if let Some(tracker) = &self.tracker {
            tracker.register(&signal, now);
        }

        signal
    }
}
