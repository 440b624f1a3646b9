//! Market data access

pub mod dexscreener;

pub use dexscreener::DexScreenerProvider;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::TokenMetrics;

/// Source of token prices and volume metrics
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_token_metrics(&self, token: &str) -> Result<TokenMetrics>;

    async fn get_current_price(&self, token: &str) -> Result<f64>;
}
