//! Transaction intake
//!
//! Raw feed frames go through [`Normalizer`] and [`Deduplicator`] before
//! reaching the aggregator. Every outcome is counted in [`IntakeStats`].

pub mod dedup;
pub mod normalizer;

pub use dedup::{DedupKey, Deduplicator};
pub use normalizer::{Normalizer, Rejected};

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

use crate::config::IntakeConfig;
use crate::types::TransactionEvent;

/// Intake counters
#[derive(Debug, Default)]
pub struct IntakeStats {
    accepted: AtomicU64,
    duplicate: AtomicU64,
    rejected_malformed: AtomicU64,
    rejected_below_minimum: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntakeSnapshot {
    pub accepted: u64,
    pub duplicate: u64,
    pub rejected_malformed: u64,
    pub rejected_below_minimum: u64,
}

impl IntakeStats {
    pub fn snapshot(&self) -> IntakeSnapshot {
        IntakeSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
            rejected_malformed: self.rejected_malformed.load(Ordering::Relaxed),
            rejected_below_minimum: self.rejected_below_minimum.load(Ordering::Relaxed),
        }
    }
}

/// Normalize + dedup front door
pub struct Intake {
    normalizer: Normalizer,
    dedup: Deduplicator,
    stats: IntakeStats,
}

impl Intake {
    pub fn new(config: &IntakeConfig) -> Self {
        Self {
            normalizer: Normalizer::new(config.min_transaction_usd),
            dedup: Deduplicator::new(config.dedup_ttl_secs, config.dedup_cleanup_interval_secs),
            stats: IntakeStats::default(),
        }
    }

    /// Run a text frame through normalization and dedup.
    /// Returns the event only if it is new and valid.
    pub fn process(&self, text: &str, source: &str, now: i64) -> Option<TransactionEvent> {
        let event = match self.normalizer.normalize_text(text, source, now) {
            Ok(event) => event,
            Err(rejected) => {
                self.record_rejection(&rejected, source);
                return None;
            }
        };

        if self.dedup.is_duplicate(&event, now) {
            self.stats.duplicate.fetch_add(1, Ordering::Relaxed);
            trace!(wallet = %event.wallet, token = %event.token, source, "Duplicate transaction");
            return None;
        }

        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        Some(event)
    }

    fn record_rejection(&self, rejected: &Rejected, source: &str) {
        match rejected {
            Rejected::Malformed(reason) => {
                self.stats.rejected_malformed.fetch_add(1, Ordering::Relaxed);
                debug!(source, reason = %reason, "Malformed payload");
            }
            Rejected::BelowMinimum { .. } => {
                self.stats.rejected_below_minimum.fetch_add(1, Ordering::Relaxed);
            }
            Rejected::Heartbeat => {}
        }
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    pub fn stats(&self) -> IntakeSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_counts_outcomes() {
        let intake = Intake::new(&IntakeConfig::default());
        let buy = r#"{"wallet":"W1","token":"T1","type":"BUY","amount_usd":300}"#;

        assert!(intake.process(buy, "primary", 1000).is_some());
        assert!(intake.process(buy, "backup", 1001).is_none());
        assert!(intake.process(r#"{"wallet":"W1"}"#, "primary", 1002).is_none());
        assert!(intake
            .process(r#"{"wallet":"W2","token":"T1","type":"BUY","amount_usd":50}"#, "primary", 1003)
            .is_none());
        assert!(intake.process(r#"{"type":"pong"}"#, "primary", 1004).is_none());

        assert_eq!(
            intake.stats(),
            IntakeSnapshot {
                accepted: 1,
                duplicate: 1,
                rejected_malformed: 1,
                rejected_below_minimum: 1,
            }
        );
    }
}
