//! Duplicate transaction suppression
//!
//! Two feeds may deliver the same transaction. A transaction is identified by
//! wallet, token, direction and amount rounded to cents; any repeat inside the
//! TTL is dropped.

use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::types::{TransactionEvent, TxType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub wallet: String,
    pub token: String,
    pub tx_type: TxType,
    pub amount_cents: i64,
}

impl DedupKey {
    pub fn from_event(event: &TransactionEvent) -> Self {
        Self {
            wallet: event.wallet.clone(),
            token: event.token.clone(),
            tx_type: event.tx_type,
            amount_cents: (event.amount_usd * 100.0).round() as i64,
        }
    }
}

struct DedupState {
    seen: HashMap<DedupKey, i64>,
    last_cleanup: i64,
}

/// TTL-based seen-set shared by all feed consumers
pub struct Deduplicator {
    ttl_secs: i64,
    cleanup_interval_secs: i64,
    state: Mutex<DedupState>,
}

impl Deduplicator {
    pub fn new(ttl_secs: u64, cleanup_interval_secs: u64) -> Self {
        Self {
            ttl_secs: ttl_secs as i64,
            cleanup_interval_secs: cleanup_interval_secs as i64,
            state: Mutex::new(DedupState {
                seen: HashMap::new(),
                last_cleanup: 0,
            }),
        }
    }

    /// Returns true if the event was already seen within the TTL.
    /// A first sighting is recorded as a side effect.
    pub fn is_duplicate(&self, event: &TransactionEvent, now: i64) -> bool {
        let key = DedupKey::from_event(event);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if now - state.last_cleanup > self.cleanup_interval_secs {
            let removed = Self::sweep(&mut state.seen, now, self.ttl_secs);
            state.last_cleanup = now;
            if removed > 0 {
                debug!(removed, remaining = state.seen.len(), "Dedup sweep");
            }
        }

        let duplicate = matches!(state.seen.get(&key), Some(&first_seen) if now - first_seen < self.ttl_secs);
        if !duplicate {
            state.seen.insert(key, now);
        }
        duplicate
    }

    /// Drop every expired entry, returns how many were removed
    pub fn cleanup(&self, now: i64) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_cleanup = now;
        Self::sweep(&mut state.seen, now, self.ttl_secs)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(seen: &mut HashMap<DedupKey, i64>, now: i64, ttl: i64) -> usize {
        let before = seen.len();
        seen.retain(|_, first_seen| now - *first_seen < ttl);
        before - seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(amount: f64) -> TransactionEvent {
        TransactionEvent {
            wallet: "W1".into(),
            token: "T1".into(),
            tx_type: TxType::Buy,
            amount_usd: amount,
            timestamp: 0,
            source: "primary".into(),
        }
    }

    #[test]
    fn test_duplicate_within_ttl() {
        let dedup = Deduplicator::new(3600, 300);
        assert!(!dedup.is_duplicate(&event(300.0), 1000));
        assert!(dedup.is_duplicate(&event(300.0), 1500));
        // Sub-cent difference collapses to the same key
        assert!(dedup.is_duplicate(&event(300.001), 1600));
        assert!(!dedup.is_duplicate(&event(300.5), 1600));
    }

    #[test]
    fn test_source_does_not_matter() {
        let dedup = Deduplicator::new(3600, 300);
        let mut other = event(300.0);
        other.source = "backup".into();
        assert!(!dedup.is_duplicate(&event(300.0), 1000));
        assert!(dedup.is_duplicate(&other, 1001));
    }

    #[test]
    fn test_expires_after_ttl() {
        let dedup = Deduplicator::new(3600, 100_000);
        assert!(!dedup.is_duplicate(&event(300.0), 1000));
        // Not swept yet, still must not count as duplicate
        assert!(!dedup.is_duplicate(&event(300.0), 1000 + 3600));
    }

    #[test]
    fn test_sweep_waits_for_full_interval() {
        let dedup = Deduplicator::new(100, 300);
        dedup.is_duplicate(&event(300.0), 1000);
        dedup.is_duplicate(&event(400.0), 1050);

        // Exactly one interval after the last sweep, nothing is dropped
        assert!(!dedup.is_duplicate(&event(500.0), 1300));
        assert_eq!(dedup.len(), 3);

        assert!(dedup.is_duplicate(&event(500.0), 1301));
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn test_cleanup() {
        let dedup = Deduplicator::new(3600, 300);
        dedup.is_duplicate(&event(300.0), 1000);
        dedup.is_duplicate(&event(400.0), 3000);
        assert_eq!(dedup.cleanup(4700), 1);
        assert_eq!(dedup.len(), 1);
    }
}
