//! Signal and performance persistence
//!
//! [`MemoryStore`] keeps everything in process and also serves as the
//! reputation backend. A database-backed store plugs in through the same traits.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::Result;
use crate::reputation::ReputationBackend;
use crate::types::{PerformanceRecord, Signal};

#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Persist a signal, returns its row id
    async fn save_signal(&self, signal: &Signal) -> Result<i64>;

    async fn save_performance(&self, record: &PerformanceRecord) -> Result<()>;

    /// When the token was flagged unsafe, if ever
    async fn get_failed_token(&self, token: &str) -> Result<Option<i64>>;

    async fn save_failed_token(&self, token: &str, reason: &str, flagged_at: i64) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FailedToken {
    pub reason: String,
    pub flagged_at: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    next_id: AtomicI64,
    signals: DashMap<String, (i64, Signal)>,
    performance: DashMap<String, Vec<PerformanceRecord>>,
    failed_tokens: DashMap<String, FailedToken>,
    wallet_scores: DashMap<String, f64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed reputation scores, e.g. from the configured wallet list
    pub fn with_wallet_scores<I>(self, scores: I) -> Self
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        for (wallet, score) in scores {
            self.wallet_scores.insert(wallet, score);
        }
        self
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn signal(&self, signal_id: &str) -> Option<Signal> {
        self.signals.get(signal_id).map(|entry| entry.value().1.clone())
    }

    /// All stored signals ordered by row id
    pub fn signals(&self) -> Vec<Signal> {
        let mut rows: Vec<(i64, Signal)> = self.signals.iter().map(|e| e.value().clone()).collect();
        rows.sort_by_key(|(id, _)| *id);
        rows.into_iter().map(|(_, signal)| signal).collect()
    }

    pub fn performance(&self, signal_id: &str) -> Vec<PerformanceRecord> {
        self.performance
            .get(signal_id)
            .map(|records| records.value().clone())
            .unwrap_or_default()
    }

    pub fn failed_token(&self, token: &str) -> Option<FailedToken> {
        self.failed_tokens.get(token).map(|e| e.value().clone())
    }

    pub fn wallet_score(&self, wallet: &str) -> Option<f64> {
        self.wallet_scores.get(wallet).map(|s| *s)
    }
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn save_signal(&self, signal: &Signal) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.signals.insert(signal.id.clone(), (id, signal.clone()));
        Ok(id)
    }

    async fn save_performance(&self, record: &PerformanceRecord) -> Result<()> {
        let mut records = self.performance.entry(record.signal_id.clone()).or_default();
        // One record per (signal, timeframe)
        if !records.iter().any(|r| r.timeframe == record.timeframe) {
            records.push(record.clone());
        }
        Ok(())
    }

    async fn get_failed_token(&self, token: &str) -> Result<Option<i64>> {
        Ok(self.failed_tokens.get(token).map(|e| e.flagged_at))
    }

    async fn save_failed_token(&self, token: &str, reason: &str, flagged_at: i64) -> Result<()> {
        self.failed_tokens.insert(
            token.to_string(),
            FailedToken {
                reason: reason.to_string(),
                flagged_at,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl ReputationBackend for MemoryStore {
    async fn get_wallet_score(&self, wallet: &str) -> Result<Option<f64>> {
        Ok(self.wallet_score(wallet))
    }

    async fn update_wallet_score(&self, wallet: &str, score: f64) -> Result<()> {
        self.wallet_scores.insert(wallet.to_string(), score);
        Ok(())
    }
}
