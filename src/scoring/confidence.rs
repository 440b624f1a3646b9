//! Confidence computation
//!
//! Wallet quality and market momentum are blended, boosted, then squashed
//! through a sigmoid so that mid-range inputs separate well.
//!
//! - Wallet factor: superlinear (s^1.5) average, trader count, quality ratio, elite bonus
//! - Market factor: 5m volume growth, 1h volume, market cap band
//! - Weighted 65/35, x1.1 for whale activity, x token-type multiplier

use serde::Serialize;

use crate::config::ScoringConfig;
use crate::reputation::{clamp_score, MAX_SCORE};
use crate::types::TokenType;

const SCORE_EXPONENT: f64 = 1.5;
const WALLET_WEIGHT: f64 = 0.65;
const MARKET_WEIGHT: f64 = 0.35;
const WHALE_BOOST: f64 = 1.1;
const SIGMOID_STEEPNESS: f64 = 8.0;
const SIGMOID_MIDPOINT: f64 = 0.5;
const CONFIDENCE_FLOOR: f64 = 0.1;

const QUALITY_SCORE: f64 = 8.0;
const TOP_SCORE: f64 = 9.0;

/// Everything the scorer needs about one candidate
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceInputs<'a> {
    pub scores: &'a [f64],
    pub volume_1h: f64,
    pub market_cap: f64,
    pub volume_growth_5m: f64,
    pub token_type: TokenType,
    pub whale_activity: bool,
}

/// Intermediate factors, useful for logging and the offline calculator
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ConfidenceBreakdown {
    pub wallet_factor: f64,
    pub growth_factor: f64,
    pub market_factor: f64,
    pub weighted: f64,
    pub confidence: f64,
}

/// Final confidence in [0.1, 1.0], or 0.0 with no scores
pub fn compute_confidence(inputs: &ConfidenceInputs<'_>, config: &ScoringConfig) -> f64 {
    confidence_breakdown(inputs, config).confidence
}

pub fn confidence_breakdown(inputs: &ConfidenceInputs<'_>, config: &ScoringConfig) -> ConfidenceBreakdown {
    if inputs.scores.is_empty() {
        return ConfidenceBreakdown::default();
    }

    let wallet_factor = wallet_factor(inputs.scores);
    let growth_factor = growth_factor(inputs.volume_growth_5m, inputs.token_type);
    let volume_factor = (inputs.volume_1h / config.high_volume_threshold).clamp(0.0, 1.0);
    let market_factor =
        0.5 * growth_factor + 0.3 * volume_factor + 0.2 * market_cap_factor(inputs.market_cap);

    let mut weighted = WALLET_WEIGHT * wallet_factor + MARKET_WEIGHT * market_factor;
    if inputs.whale_activity {
        weighted *= WHALE_BOOST;
    }
    weighted *= inputs.token_type.multiplier();

    ConfidenceBreakdown {
        wallet_factor,
        growth_factor,
        market_factor,
        weighted,
        confidence: squash(weighted),
    }
}

fn wallet_factor(scores: &[f64]) -> f64 {
    let n = scores.len() as f64;
    let clamped: Vec<f64> = scores.iter().map(|s| clamp_score(*s)).collect();

    let transformed_avg = clamped.iter().map(|s| s.powf(SCORE_EXPONENT)).sum::<f64>() / n;
    let quality_component = transformed_avg / MAX_SCORE.powf(SCORE_EXPONENT);

    let count_component = n.min(10.0) / 10.0;

    // Wallets above the top score are counted twice
    let quality = clamped.iter().filter(|s| **s > QUALITY_SCORE).count()
        + clamped.iter().filter(|s| **s > TOP_SCORE).count();
    let quality_ratio = (quality as f64 / n).min(1.0);

    let elite = clamped.iter().filter(|s| **s >= TOP_SCORE).count();
    let elite_bonus = (0.1 * elite as f64).min(0.3);

    0.4 * quality_component + 0.3 * count_component + 0.2 * quality_ratio + elite_bonus
}

fn growth_factor(growth_5m: f64, token_type: TokenType) -> f64 {
    let scale = if token_type.is_meme() { 3.0 } else { 1.5 };
    (growth_5m.max(0.0) * scale).min(1.0)
}

fn market_cap_factor(market_cap: f64) -> f64 {
    if !market_cap.is_finite() || market_cap <= 0.0 {
        0.5
    } else if market_cap < 100_000.0 {
        0.3
    } else if market_cap > 500_000_000.0 {
        0.2
    } else {
        1.0
    }
}

fn squash(x: f64) -> f64 {
    let sigmoid = 1.0 / (1.0 + (-SIGMOID_STEEPNESS * (x - SIGMOID_MIDPOINT)).exp());
    let clamped = sigmoid.clamp(CONFIDENCE_FLOOR, 1.0);
    (clamped * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn inputs(scores: &[f64]) -> ConfidenceInputs<'_> {
        ConfidenceInputs {
            scores,
            volume_1h: 50_000.0,
            market_cap: 1_000_000.0,
            volume_growth_5m: 0.10,
            token_type: TokenType::Unknown,
            whale_activity: false,
        }
    }

    #[test]
    fn test_empty_scores() {
        assert_eq!(compute_confidence(&inputs(&[]), &ScoringConfig::default()), 0.0);
    }

    #[test]
    fn test_three_good_wallets() {
        let config = ScoringConfig::default();
        let breakdown = confidence_breakdown(&inputs(&[8.0, 7.5, 9.0]), &config);

        assert!((breakdown.wallet_factor - 0.5525).abs() < 1e-3);
        assert!((breakdown.market_factor - 0.575).abs() < 1e-9);
        assert!((breakdown.confidence - 0.618).abs() < 0.002);
    }

    #[test]
    fn test_bounds_and_rounding() {
        let config = ScoringConfig::default();

        let weak = ConfidenceInputs {
            volume_1h: 0.0,
            volume_growth_5m: -0.5,
            market_cap: 10_000.0,
            token_type: TokenType::Stable,
            ..inputs(&[0.0])
        };
        assert_eq!(compute_confidence(&weak, &config), 0.1);

        let strong = ConfidenceInputs {
            token_type: TokenType::Meme,
            whale_activity: true,
            volume_growth_5m: 1.0,
            ..inputs(&[10.0, 10.0, 10.0, 10.0])
        };
        let confidence = compute_confidence(&strong, &config);
        assert!(confidence > 0.99 && confidence <= 1.0);
        assert_eq!(confidence, (confidence * 1000.0).round() / 1000.0);
    }

    #[test]
    fn test_token_type_and_whale_raise_confidence() {
        let config = ScoringConfig::default();
        let scores = [7.0, 7.0];
        let base = compute_confidence(&inputs(&scores), &config);

        let whale = ConfidenceInputs {
            whale_activity: true,
            ..inputs(&scores)
        };
        assert!(compute_confidence(&whale, &config) > base);

        let stable = ConfidenceInputs {
            token_type: TokenType::Stable,
            ..inputs(&scores)
        };
        assert!(compute_confidence(&stable, &config) < base);
    }

    #[test]
    fn test_market_cap_bands() {
        assert_eq!(market_cap_factor(0.0), 0.5);
        assert_eq!(market_cap_factor(50_000.0), 0.3);
        assert_eq!(market_cap_factor(2_000_000.0), 1.0);
        assert_eq!(market_cap_factor(900_000_000.0), 0.2);
    }

    #[test]
    fn test_monotonic_in_each_score() {
        let config = ScoringConfig::default();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..300 {
            let n = rng.gen_range(1..8);
            let scores: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..10.0)).collect();
            let idx = rng.gen_range(0..n);

            let mut raised = scores.clone();
            raised[idx] = (raised[idx] + rng.gen_range(0.0..3.0)).min(10.0);

            let template = ConfidenceInputs {
                volume_1h: rng.gen_range(0.0..20_000.0),
                market_cap: rng.gen_range(0.0..1e9),
                volume_growth_5m: rng.gen_range(-0.2..0.5),
                token_type: TokenType::Meme,
                whale_activity: rng.gen_bool(0.5),
                ..inputs(&scores)
            };
            let before = compute_confidence(&template, &config);
            let after = compute_confidence(&ConfidenceInputs { scores: &raised, ..template }, &config);

            assert!(after >= before, "{:?} -> {:?}: {} > {}", scores, raised, before, after);
        }
    }
}
