//! Whale transaction detection
//!
//! A whale transaction is large relative to the token's size. The threshold is a
//! tiered percentage of market cap (or 10x the hourly volume when the market cap
//! is unknown), never below a fixed USD floor.

use serde::Serialize;

use crate::aggregator::CandidateTransaction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WhaleReport {
    pub has_whale_activity: bool,
    pub whale_count: usize,
    pub threshold_usd: f64,
    /// Share of candidate volume coming from whale transactions
    pub whale_volume_share: f64,
    /// 0..1 blend of whale count and volume share
    pub impact_score: f64,
}

/// USD size at which a single transaction counts as a whale
pub fn whale_threshold(market_cap: f64, volume_1h: f64, min_whale_usd: f64) -> f64 {
    let base = if market_cap > 0.0 {
        market_cap
    } else {
        volume_1h.max(0.0) * 10.0
    };

    let pct = if base < 100_000.0 {
        0.03
    } else if base < 1_000_000.0 {
        0.02
    } else if base < 10_000_000.0 {
        0.01
    } else {
        0.005
    };

    (base * pct).max(min_whale_usd)
}

pub fn detect_whale_activity(
    transactions: &[CandidateTransaction],
    market_cap: f64,
    volume_1h: f64,
    min_whale_usd: f64,
) -> WhaleReport {
    let threshold_usd = whale_threshold(market_cap, volume_1h, min_whale_usd);
    if transactions.is_empty() {
        return WhaleReport {
            threshold_usd,
            ..Default::default()
        };
    }

    let total: f64 = transactions.iter().map(|tx| tx.raw_amount_usd).sum();
    let whales: Vec<f64> = transactions
        .iter()
        .map(|tx| tx.raw_amount_usd)
        .filter(|amount| *amount >= threshold_usd)
        .collect();
    let whale_volume: f64 = whales.iter().sum();

    let whale_volume_share = if total > 0.0 { whale_volume / total } else { 0.0 };
    let impact_score = if whales.is_empty() {
        0.0
    } else {
        0.4 * (whales.len() as f64 / 5.0).min(1.0) + 0.6 * (whale_volume_share * 2.0).min(1.0)
    };

    WhaleReport {
        has_whale_activity: !whales.is_empty(),
        whale_count: whales.len(),
        threshold_usd,
        whale_volume_share,
        impact_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxType;

    fn tx(amount: f64) -> CandidateTransaction {
        CandidateTransaction {
            wallet: "W1".into(),
            tx_type: TxType::Buy,
            amount_usd: amount,
            raw_amount_usd: amount,
            timestamp: 0,
        }
    }

    #[test]
    fn test_threshold_tiers() {
        assert_eq!(whale_threshold(50_000.0, 0.0, 5000.0), 5000.0);
        assert_eq!(whale_threshold(800_000.0, 0.0, 5000.0), 16_000.0);
        assert_eq!(whale_threshold(5_000_000.0, 0.0, 5000.0), 50_000.0);
        assert_eq!(whale_threshold(100_000_000.0, 0.0, 5000.0), 500_000.0);
        // Unknown market cap falls back to 10x hourly volume
        assert_eq!(whale_threshold(0.0, 80_000.0, 5000.0), 16_000.0);
    }

    #[test]
    fn test_detection() {
        let report = detect_whale_activity(&[tx(300.0), tx(20_000.0), tx(700.0)], 800_000.0, 0.0, 5000.0);
        assert!(report.has_whale_activity);
        assert_eq!(report.whale_count, 1);
        assert!(report.whale_volume_share > 0.9);

        let quiet = detect_whale_activity(&[tx(300.0), tx(700.0)], 800_000.0, 0.0, 5000.0);
        assert!(!quiet.has_whale_activity);
        assert_eq!(quiet.impact_score, 0.0);
    }
}
