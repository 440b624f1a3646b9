//! Candidate window aggregator
//!
//! Owns every per-token candidate plus the signaled and failed registries.
//! All methods take an explicit `now` so the window logic stays deterministic.

pub mod candidate;

pub use candidate::{CandidateTransaction, TokenCandidate};

use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

use crate::config::AggregatorConfig;
use crate::types::TransactionEvent;

/// What happened to a transaction handed to the aggregator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddOutcome {
    Created,
    Updated,
    /// Token already produced a signal and is cooling down
    IgnoredSignaled,
    /// Token was flagged unsafe
    IgnoredFailed,
}

/// Result of a sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub evicted: usize,
    pub signaled_forgotten: usize,
    pub failed_forgotten: usize,
}

pub struct Aggregator {
    config: AggregatorConfig,
    candidates: HashMap<String, TokenCandidate>,
    /// token -> time the signal was emitted
    signaled: HashMap<String, i64>,
    /// token -> time it was flagged
    failed: HashMap<String, i64>,
    /// wallet -> timestamps of its recent transactions, all tokens
    wallet_activity: HashMap<String, VecDeque<i64>>,
    last_cleanup: i64,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            candidates: HashMap::new(),
            signaled: HashMap::new(),
            failed: HashMap::new(),
            wallet_activity: HashMap::new(),
            last_cleanup: 0,
        }
    }

    /// Record a transaction against its token's candidate
    pub fn add_transaction(&mut self, event: &TransactionEvent, now: i64) -> AddOutcome {
        self.maybe_cleanup(now);

        if self.is_signaled(&event.token, now) {
            debug!(token = %event.token, "Ignoring transaction for signaled token");
            return AddOutcome::IgnoredSignaled;
        }
        if self.is_failed(&event.token, now) {
            debug!(token = %event.token, "Ignoring transaction for failed token");
            return AddOutcome::IgnoredFailed;
        }

        let credited = self.credited_amount(event);

        let mut outcome = AddOutcome::Updated;
        let candidate = self.candidates.entry(event.token.clone()).or_insert_with(|| {
            outcome = AddOutcome::Created;
            TokenCandidate::new(&event.token, event.timestamp)
        });
        candidate.record(event, credited);

        if outcome == AddOutcome::Created {
            debug!(token = %event.token, wallet = %event.wallet, "New candidate");
        }

        outcome
    }

    /// Apply the per-wallet activity throttle and return the USD to credit
    fn credited_amount(&mut self, event: &TransactionEvent) -> f64 {
        let window = self.config.high_activity_window_secs as i64;
        let activity = self.wallet_activity.entry(event.wallet.clone()).or_default();

        activity.push_back(event.timestamp);
        while let Some(&oldest) = activity.front() {
            if event.timestamp - oldest >= window {
                activity.pop_front();
            } else {
                break;
            }
        }

        if activity.len() > self.config.high_activity_threshold {
            debug!(
                wallet = %event.wallet,
                count = activity.len(),
                "High activity wallet, discounting"
            );
            event.amount_usd * self.config.high_activity_discount
        } else {
            event.amount_usd
        }
    }

    /// Sweep if the cleanup interval elapsed since the last sweep
    pub fn maybe_cleanup(&mut self, now: i64) -> Option<CleanupReport> {
        if now - self.last_cleanup > self.config.cleanup_interval_secs as i64 {
            Some(self.cleanup(now))
        } else {
            None
        }
    }

    /// Evict stale candidates and forget expired registry entries
    pub fn cleanup(&mut self, now: i64) -> CleanupReport {
        self.last_cleanup = now;

        let max_age = self.config.max_age_secs as i64;
        let cooldown = self.config.resignal_cooldown_secs as i64;
        let failed_ttl = self.config.failed_token_ttl_secs as i64;
        let activity_window = self.config.high_activity_window_secs as i64;

        let before = self.candidates.len();
        self.candidates.retain(|_, c| now - c.last_seen <= max_age);
        let evicted = before - self.candidates.len();

        let before = self.signaled.len();
        self.signaled.retain(|_, ts| now - *ts < cooldown);
        let signaled_forgotten = before - self.signaled.len();

        let before = self.failed.len();
        self.failed.retain(|_, ts| now - *ts < failed_ttl);
        let failed_forgotten = before - self.failed.len();

        self.wallet_activity.retain(|_, stamps| {
            stamps.retain(|ts| now - *ts < activity_window);
            !stamps.is_empty()
        });

        let report = CleanupReport {
            evicted,
            signaled_forgotten,
            failed_forgotten,
        };
        if evicted > 0 {
            info!(
                evicted,
                active = self.candidates.len(),
                "Evicted inactive candidates"
            );
        }
        report
    }

    /// Remove the candidate and remember the token as signaled
    pub fn mark_signaled(&mut self, token: &str, now: i64) -> Option<TokenCandidate> {
        self.signaled.insert(token.to_string(), now);
        self.candidates.remove(token)
    }

    /// Remove the candidate and ignore the token for the failed TTL
    pub fn mark_failed(&mut self, token: &str, now: i64) -> Option<TokenCandidate> {
        self.failed.insert(token.to_string(), now);
        self.candidates.remove(token)
    }

    pub fn is_signaled(&mut self, token: &str, now: i64) -> bool {
        let cooldown = self.config.resignal_cooldown_secs as i64;
        match self.signaled.get(token) {
            Some(&ts) if now - ts < cooldown => true,
            Some(_) => {
                self.signaled.remove(token);
                false
            }
            None => false,
        }
    }

    pub fn is_failed(&mut self, token: &str, now: i64) -> bool {
        let ttl = self.config.failed_token_ttl_secs as i64;
        match self.failed.get(token) {
            Some(&ts) if now - ts < ttl => true,
            Some(_) => {
                self.failed.remove(token);
                false
            }
            None => false,
        }
    }

    pub fn remove(&mut self, token: &str) -> Option<TokenCandidate> {
        self.candidates.remove(token)
    }

    pub fn active_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn snapshot(&self, token: &str) -> Option<TokenCandidate> {
        self.candidates.get(token).cloned()
    }

    /// All candidates ordered by priority (trader count × USD total)
    /// descending, ties broken by token id
    pub fn ranked_candidates(&self) -> Vec<TokenCandidate> {
        let mut ranked: Vec<TokenCandidate> = self.candidates.values().cloned().collect();
        ranked.sort_by(|a, b| {
            b.priority()
                .total_cmp(&a.priority())
                .then_with(|| a.token.cmp(&b.token))
        });
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxType;

    fn buy(wallet: &str, token: &str, amount: f64, ts: i64) -> TransactionEvent {
        TransactionEvent {
            wallet: wallet.into(),
            token: token.into(),
            tx_type: TxType::Buy,
            amount_usd: amount,
            timestamp: ts,
            source: "test".into(),
        }
    }

    #[test]
    fn test_create_and_update() {
        let mut agg = Aggregator::new(AggregatorConfig::default());
        assert_eq!(agg.add_transaction(&buy("W1", "T1", 300.0, 1000), 1000), AddOutcome::Created);
        assert_eq!(agg.add_transaction(&buy("W2", "T1", 300.0, 1010), 1010), AddOutcome::Updated);

        let candidate = agg.snapshot("T1").unwrap();
        assert_eq!(candidate.first_seen, 1000);
        assert_eq!(candidate.last_seen, 1010);
        assert_eq!(candidate.trader_count(), 2);
        assert_eq!(agg.active_count(), 1);
    }

    #[test]
    fn test_high_activity_discount() {
        let mut agg = Aggregator::new(AggregatorConfig::default());
        for i in 0..25 {
            let token = format!("T{}", i);
            agg.add_transaction(&buy("W1", &token, 400.0, 1000 + i * 60), 1000 + i * 60);
        }

        for i in 0..25 {
            let candidate = agg.snapshot(&format!("T{}", i)).unwrap();
            let expected = if i >= 20 { 200.0 } else { 400.0 };
            assert_eq!(candidate.usd_total, expected, "token T{}", i);
            assert_eq!(candidate.transactions[0].raw_amount_usd, 400.0);
        }
    }

    #[test]
    fn test_eviction() {
        let mut agg = Aggregator::new(AggregatorConfig::default());
        agg.add_transaction(&buy("W1", "OLD", 300.0, 1000), 1000);
        agg.add_transaction(&buy("W1", "FRESH", 300.0, 4000), 4000);

        let report = agg.cleanup(4601);
        assert_eq!(report.evicted, 1);
        assert!(agg.snapshot("OLD").is_none());
        assert!(agg.snapshot("FRESH").is_some());
    }

    #[test]
    fn test_sweep_waits_for_full_interval() {
        let config = AggregatorConfig {
            max_age_secs: 100,
            cleanup_interval_secs: 300,
            ..Default::default()
        };
        let mut agg = Aggregator::new(config);
        agg.add_transaction(&buy("W1", "T1", 300.0, 1000), 1000);

        assert!(agg.maybe_cleanup(1300).is_none());
        assert!(agg.snapshot("T1").is_some());

        let report = agg.maybe_cleanup(1301).unwrap();
        assert_eq!(report.evicted, 1);
    }

    #[test]
    fn test_signaled_cooldown() {
        let mut agg = Aggregator::new(AggregatorConfig::default());
        agg.add_transaction(&buy("W1", "T1", 300.0, 1000), 1000);
        assert!(agg.mark_signaled("T1", 2000).is_some());

        assert_eq!(
            agg.add_transaction(&buy("W2", "T1", 300.0, 2100), 2100),
            AddOutcome::IgnoredSignaled
        );
        assert_eq!(agg.active_count(), 0);

        // Cooldown over, a fresh candidate may form
        assert_eq!(agg.add_transaction(&buy("W2", "T1", 300.0, 5600), 5600), AddOutcome::Created);
    }

    #[test]
    fn test_failed_token_ignored() {
        let mut agg = Aggregator::new(AggregatorConfig::default());
        agg.add_transaction(&buy("W1", "T2", 300.0, 1000), 1000);
        agg.mark_failed("T2", 1500);

        assert!(agg.snapshot("T2").is_none());
        assert_eq!(
            agg.add_transaction(&buy("W2", "T2", 900.0, 1600), 1600),
            AddOutcome::IgnoredFailed
        );
        assert_eq!(
            agg.add_transaction(&buy("W2", "T2", 900.0, 1500 + 86_399), 1500 + 86_399),
            AddOutcome::IgnoredFailed
        );
        assert_eq!(
            agg.add_transaction(&buy("W2", "T2", 900.0, 1500 + 86_400), 1500 + 86_400),
            AddOutcome::Created
        );
    }

    #[test]
    fn test_ranked_order() {
        let mut agg = Aggregator::new(AggregatorConfig::default());
        agg.add_transaction(&buy("W1", "B", 300.0, 1000), 1000);
        agg.add_transaction(&buy("W1", "A", 300.0, 1000), 1000);
        agg.add_transaction(&buy("W1", "C", 300.0, 1000), 1000);
        agg.add_transaction(&buy("W2", "C", 300.0, 1000), 1000);

        let order: Vec<String> = agg.ranked_candidates().into_iter().map(|c| c.token).collect();
        assert_eq!(order, vec!["C", "A", "B"]);
    }
}
