//! Features handed to the optional success estimator

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::aggregator::TokenCandidate;
use crate::error::Result;
use crate::types::TokenMetrics;

pub type FeatureMap = BTreeMap<String, f64>;

/// Learned probability that a candidate turns into a winning signal
#[async_trait]
pub trait SuccessEstimator: Send + Sync {
    /// Probability in [0, 1]
    async fn predict_success(&self, features: &FeatureMap) -> Result<f64>;
}

/// Per-candidate values derived during evaluation
#[derive(Debug, Clone, Copy)]
pub struct ScoreSummary {
    pub average: f64,
    pub max: f64,
    pub high_quality: usize,
    pub elite: usize,
}

impl ScoreSummary {
    pub fn from_scores(scores: &[f64], high_quality_score: f64) -> Self {
        let n = scores.len().max(1) as f64;
        Self {
            average: scores.iter().sum::<f64>() / n,
            max: scores.iter().copied().fold(0.0, f64::max),
            high_quality: scores.iter().filter(|s| **s >= high_quality_score).count(),
            elite: scores.iter().filter(|s| **s >= 9.0).count(),
        }
    }
}

pub fn build_features(
    candidate: &TokenCandidate,
    metrics: &TokenMetrics,
    summary: &ScoreSummary,
    whale_activity: bool,
    rule_confidence: f64,
    now: i64,
) -> FeatureMap {
    let trader_count = candidate.trader_count() as f64;
    let mut features = FeatureMap::new();

    features.insert("trader_count".into(), trader_count);
    features.insert("transaction_count".into(), candidate.transactions.len() as f64);
    features.insert("window_secs".into(), candidate.age(now) as f64);
    features.insert("tx_velocity".into(), candidate.tx_velocity(now));
    features.insert("buy_sell_ratio".into(), candidate.buy_sell_ratio());
    features.insert("usd_total".into(), candidate.usd_total);
    features.insert("volume_1h".into(), metrics.volume_1h);
    features.insert("market_cap".into(), metrics.market_cap);
    features.insert("volume_growth_5m".into(), metrics.volume_growth_5m);
    features.insert("volume_growth_1h".into(), metrics.volume_growth_1h);
    features.insert("liquidity".into(), metrics.liquidity.unwrap_or(0.0));
    features.insert("avg_wallet_score".into(), summary.average);
    features.insert("max_wallet_score".into(), summary.max);
    features.insert(
        "high_quality_ratio".into(),
        summary.high_quality as f64 / trader_count.max(1.0),
    );
    features.insert("elite_trader_count".into(), summary.elite as f64);
    features.insert("whale_activity".into(), if whale_activity { 1.0 } else { 0.0 });
    features.insert("rule_confidence".into(), rule_confidence);

    features
}
