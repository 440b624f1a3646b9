//! Wallet reputation store
//!
//! Scores live in [0, 10]. A wallet may carry a temporary multiplicative
//! booster; the effective score is always clamped back into range.
//! Missing wallets are loaded from the [`ReputationBackend`] on first use.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ReputationConfig;
use crate::error::Result;
use crate::types::TxType;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;

/// Persistence for wallet reputation
#[async_trait]
pub trait ReputationBackend: Send + Sync {
    /// Stored score, `None` for an unknown wallet
    async fn get_wallet_score(&self, wallet: &str) -> Result<Option<f64>>;

    async fn update_wallet_score(&self, wallet: &str, score: f64) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Booster {
    pub multiplier: f64,
    pub expires_at: i64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalletScoreEntry {
    pub wallet: String,
    pub base_score: f64,
    pub booster: Option<Booster>,
}

impl WalletScoreEntry {
    pub fn new(wallet: &str, base_score: f64) -> Self {
        Self {
            wallet: wallet.to_string(),
            base_score: clamp_score(base_score),
            booster: None,
        }
    }

    /// Effective score at `now`; an expired booster is deactivated in place
    pub fn effective_score(&mut self, now: i64) -> f64 {
        let multiplier = match self.booster.as_mut() {
            Some(booster) if booster.active && now < booster.expires_at => booster.multiplier,
            Some(booster) => {
                booster.active = false;
                1.0
            }
            None => 1.0,
        };
        clamp_score(self.base_score * multiplier)
    }
}

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return MIN_SCORE;
    }
    score.clamp(MIN_SCORE, MAX_SCORE)
}

pub struct ReputationStore {
    config: ReputationConfig,
    entries: Mutex<HashMap<String, WalletScoreEntry>>,
    backend: Arc<dyn ReputationBackend>,
}

impl ReputationStore {
    pub fn new(config: ReputationConfig, backend: Arc<dyn ReputationBackend>) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            backend,
        }
    }

    /// Effective score for a wallet, always within [0, 10]
    pub async fn get_score(&self, wallet: &str, now: i64) -> f64 {
        if let Some(entry) = self.entries.lock().await.get_mut(wallet) {
            return entry.effective_score(now);
        }

        let base = self.load_base_score(wallet).await;
        let mut entries = self.entries.lock().await;
        entries
            .entry(wallet.to_string())
            .or_insert_with(|| WalletScoreEntry::new(wallet, base))
            .effective_score(now)
    }

    /// Effective scores for several wallets, in order
    pub async fn scores_for<'a, I>(&self, wallets: I, now: i64) -> Vec<f64>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut scores = Vec::new();
        for wallet in wallets {
            scores.push(self.get_score(wallet, now).await);
        }
        scores
    }

    /// Attach a booster, replacing any existing one
    pub async fn apply_booster(&self, wallet: &str, multiplier: f64, duration_secs: u64, now: i64) {
        self.ensure_loaded(wallet).await;

        let multiplier = multiplier.clamp(0.0, self.config.max_booster_multiplier);
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(wallet) {
            entry.booster = Some(Booster {
                multiplier,
                expires_at: now + duration_secs as i64,
                active: true,
            });
            debug!(wallet, multiplier, duration_secs, "Booster applied");
        }
    }

    /// Nudge the base score after an observed trade and write it through
    pub async fn update_score_on_trade(&self, wallet: &str, tx_type: TxType) -> f64 {
        self.ensure_loaded(wallet).await;

        let increment = match tx_type {
            TxType::Buy => self.config.buy_increment,
            TxType::Sell => self.config.sell_increment,
        };

        let updated = {
            let mut entries = self.entries.lock().await;
            let entry = entries
                .entry(wallet.to_string())
                .or_insert_with(|| WalletScoreEntry::new(wallet, self.config.default_score));
            entry.base_score = clamp_score(entry.base_score + increment);
            entry.base_score
        };

        if let Err(e) = self.backend.update_wallet_score(wallet, updated).await {
            warn!(wallet, error = %e, "Failed to persist wallet score");
        }

        updated
    }

    /// Seed a wallet's base score without touching persistence
    pub async fn set_base_score(&self, wallet: &str, score: f64) {
        let mut entries = self.entries.lock().await;
        entries
            .entry(wallet.to_string())
            .and_modify(|e| e.base_score = clamp_score(score))
            .or_insert_with(|| WalletScoreEntry::new(wallet, score));
    }

    pub async fn cached_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    async fn ensure_loaded(&self, wallet: &str) {
        if self.entries.lock().await.contains_key(wallet) {
            return;
        }
        let base = self.load_base_score(wallet).await;
        self.entries
            .lock()
            .await
            .entry(wallet.to_string())
            .or_insert_with(|| WalletScoreEntry::new(wallet, base));
    }

    async fn load_base_score(&self, wallet: &str) -> f64 {
        match self.backend.get_wallet_score(wallet).await {
            Ok(Some(score)) => score,
            Ok(None) => self.config.default_score,
            Err(e) => {
                warn!(wallet, error = %e, "Reputation backend unavailable, using default score");
                self.config.default_score
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeBackend {
        scores: StdMutex<HashMap<String, f64>>,
        fail: bool,
    }

    #[async_trait]
    impl ReputationBackend for FakeBackend {
        async fn get_wallet_score(&self, wallet: &str) -> Result<Option<f64>> {
            if self.fail {
                return Err(Error::Reputation("offline".into()));
            }
            Ok(self.scores.lock().unwrap().get(wallet).copied())
        }

        async fn update_wallet_score(&self, wallet: &str, score: f64) -> Result<()> {
            if self.fail {
                return Err(Error::Reputation("offline".into()));
            }
            self.scores.lock().unwrap().insert(wallet.to_string(), score);
            Ok(())
        }
    }

    fn store_with(backend: Arc<FakeBackend>) -> ReputationStore {
        ReputationStore::new(ReputationConfig::default(), backend)
    }

    #[tokio::test]
    async fn test_loads_from_backend_or_default() {
        let backend = Arc::new(FakeBackend::default());
        backend.scores.lock().unwrap().insert("W1".into(), 8.5);
        let store = store_with(backend);

        assert_eq!(store.get_score("W1", 0).await, 8.5);
        assert_eq!(store.get_score("W2", 0).await, 5.0);
    }

    #[tokio::test]
    async fn test_backend_failure_uses_default() {
        let backend = Arc::new(FakeBackend {
            fail: true,
            ..Default::default()
        });
        let store = store_with(backend);
        assert_eq!(store.get_score("W1", 0).await, 5.0);
        // Write-through failure is swallowed
        assert!((store.update_score_on_trade("W1", TxType::Sell).await - 5.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_booster_clamped_and_expires() {
        let store = store_with(Arc::new(FakeBackend::default()));
        store.set_base_score("W1", 6.0).await;
        store.apply_booster("W1", 5.0, 600, 1000).await;

        // Multiplier capped at 3.0, result clamped to 10
        assert_eq!(store.get_score("W1", 1100).await, 10.0);
        // Expired booster is ignored
        assert_eq!(store.get_score("W1", 1600).await, 6.0);

        let entries = store.entries.lock().await;
        assert!(!entries["W1"].booster.unwrap().active);
    }

    #[tokio::test]
    async fn test_trade_updates_write_through() {
        let backend = Arc::new(FakeBackend::default());
        let store = store_with(backend.clone());

        store.update_score_on_trade("W1", TxType::Buy).await;
        store.update_score_on_trade("W1", TxType::Sell).await;
        let stored = backend.scores.lock().unwrap()["W1"];
        assert!((stored - 5.3).abs() < 1e-9);

        store.set_base_score("W2", 9.95).await;
        assert_eq!(store.update_score_on_trade("W2", TxType::Sell).await, 10.0);
    }

    #[tokio::test]
    async fn test_score_always_in_range() {
        let store = store_with(Arc::new(FakeBackend::default()));
        let mut rng = StdRng::seed_from_u64(7);

        for i in 0..500 {
            let wallet = format!("W{}", i);
            let base: f64 = rng.gen_range(-5.0..15.0);
            let multiplier: f64 = rng.gen_range(0.0..20.0);
            let now: i64 = rng.gen_range(0..10_000);

            store.set_base_score(&wallet, base).await;
            store.apply_booster(&wallet, multiplier, rng.gen_range(1..5_000), now).await;

            let score = store.get_score(&wallet, now + rng.gen_range(0..5_000)).await;
            assert!((MIN_SCORE..=MAX_SCORE).contains(&score), "score {} out of range", score);
        }
    }
}
