// DexScreener API client for token metrics
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use super::MarketDataProvider;
use crate::config::MarketConfig;
use crate::error::{Error, Result};
use crate::types::{TokenMetrics, TokenType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceChange {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseToken {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPair {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "dexId")]
    pub dex_id: String,
    #[serde(rename = "pairAddress")]
    pub pair_address: String,
    #[serde(rename = "baseToken")]
    pub base_token: BaseToken,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    #[serde(rename = "priceChange")]
    pub price_change: Option<PriceChange>,
    pub volume: Option<Volume>,
    pub liquidity: Option<Liquidity>,
    #[serde(rename = "marketCap")]
    pub market_cap: Option<f64>,
    #[serde(rename = "fdv")]
    pub fdv: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPairsResponse {
    pub pairs: Option<Vec<DexPair>>,
}

impl DexPair {
    pub fn price(&self) -> Option<f64> {
        self.price_usd.as_ref().and_then(|p| p.parse::<f64>().ok())
    }

    /// Pump-launched tokens are treated as memes, everything else unclassified
    pub fn token_type(&self) -> Option<TokenType> {
        if self.dex_id == "pumpswap" || self.dex_id == "pumpfun" || self.base_token.address.ends_with("pump") {
            Some(TokenType::Meme)
        } else {
            None
        }
    }

    /// Convert to metrics. Volume growth needs history and is left at zero.
    pub fn to_metrics(&self) -> TokenMetrics {
        TokenMetrics {
            price: self.price().unwrap_or(0.0),
            market_cap: self.market_cap.or(self.fdv).unwrap_or(0.0),
            volume_1h: self.volume.as_ref().and_then(|v| v.h1).unwrap_or(0.0),
            volume_growth_5m: 0.0,
            volume_growth_1h: 0.0,
            liquidity: self.liquidity.as_ref().and_then(|l| l.usd),
            token_type: self.token_type(),
        }
    }
}

/// Oldest snapshot kept per token
const HISTORY_RETENTION_SECS: i64 = 7200;

/// Per-token `(timestamp, volume_1h)` snapshots taken on every metrics fetch.
/// Growth over a horizon compares the latest snapshot with the one closest
/// to `now - horizon`.
#[derive(Default)]
pub struct VolumeHistory {
    snapshots: DashMap<String, VecDeque<(i64, f64)>>,
}

impl VolumeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, token: &str, ts: i64, volume: f64) {
        let mut entry = self.snapshots.entry(token.to_string()).or_default();
        entry.push_back((ts, volume));
        while entry.front().is_some_and(|(t, _)| ts - *t > HISTORY_RETENTION_SECS) {
            entry.pop_front();
        }
    }

    /// Relative growth over `horizon_secs`, zero without a usable baseline
    pub fn growth(&self, token: &str, now: i64, horizon_secs: i64) -> f64 {
        let Some(entry) = self.snapshots.get(token) else {
            return 0.0;
        };
        if entry.len() < 2 {
            return 0.0;
        }
        let Some(&(_, current)) = entry.back() else {
            return 0.0;
        };

        let target = now - horizon_secs;
        let past = entry
            .iter()
            .min_by_key(|(ts, _)| (ts - target).abs())
            .map(|(_, v)| *v)
            .unwrap_or(0.0);

        if past <= 0.0 {
            0.0
        } else {
            (current - past) / past
        }
    }

    pub fn snapshot_count(&self, token: &str) -> usize {
        self.snapshots.get(token).map(|e| e.len()).unwrap_or(0)
    }
}

pub struct DexScreenerProvider {
    client: reqwest::Client,
    base_url: String,
    chain_id: String,
    history: VolumeHistory,
}

impl DexScreenerProvider {
    pub fn new(config: &MarketConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chain_id: config.chain_id.clone(),
            history: VolumeHistory::new(),
        })
    }

    /// Fetch the most liquid pair for a token on the configured chain
    pub async fn get_token_pair(&self, token: &str) -> Result<Option<DexPair>> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, token);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::market_data(token, e))?;
        let data: TokenPairsResponse = resp.json().await.map_err(|e| Error::market_data(token, e))?;

        Ok(select_pair(data.pairs.unwrap_or_default(), &self.chain_id))
    }
}

fn select_pair(pairs: Vec<DexPair>, chain_id: &str) -> Option<DexPair> {
    pairs
        .into_iter()
        .filter(|p| p.chain_id == chain_id)
        .max_by(|a, b| {
            let la = a.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            let lb = b.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            la.total_cmp(&lb)
        })
}

#[async_trait]
impl MarketDataProvider for DexScreenerProvider {
    async fn get_token_metrics(&self, token: &str) -> Result<TokenMetrics> {
        let pair = self
            .get_token_pair(token)
            .await?
            .ok_or_else(|| Error::market_data(token, "no pairs listed"))?;

        let mut metrics = pair.to_metrics();
        let now = chrono::Utc::now().timestamp();
        self.history.record(token, now, metrics.volume_1h);
        metrics.volume_growth_5m = self.history.growth(token, now, 300);
        metrics.volume_growth_1h = self.history.growth(token, now, 3600);

        debug!(
            token,
            price = metrics.price,
            volume_1h = metrics.volume_1h,
            market_cap = metrics.market_cap,
            volume_growth_5m = metrics.volume_growth_5m,
            "Fetched token metrics"
        );
        Ok(metrics)
    }

    async fn get_current_price(&self, token: &str) -> Result<f64> {
        let pair = self
            .get_token_pair(token)
            .await?
            .ok_or_else(|| Error::market_data(token, "no pairs listed"))?;

        pair.price()
            .filter(|p| *p > 0.0)
            .ok_or_else(|| Error::market_data(token, "no usable price"))
    }
}
