//! Shared domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Direction of a wallet transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxType {
    Buy,
    Sell,
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxType::Buy => write!(f, "BUY"),
            TxType::Sell => write!(f, "SELL"),
        }
    }
}

/// Normalized transaction produced by intake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub wallet: String,
    pub token: String,
    pub tx_type: TxType,
    pub amount_usd: f64,
    /// Seconds since epoch
    pub timestamp: i64,
    /// Feed the event came from
    pub source: String,
}

/// Token classification used by the confidence multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Meme,
    Defi,
    Nft,
    Gaming,
    Ai,
    New,
    Exchange,
    Stable,
    Unknown,
}

impl TokenType {
    /// Confidence multiplier for this token type
    pub fn multiplier(&self) -> f64 {
        match self {
            TokenType::Meme => 1.3,
            TokenType::Defi => 1.1,
            TokenType::Nft => 1.15,
            TokenType::Gaming => 1.1,
            TokenType::Ai => 1.2,
            TokenType::New => 1.25,
            TokenType::Exchange => 1.0,
            TokenType::Stable => 0.9,
            TokenType::Unknown => 1.0,
        }
    }

    pub fn is_meme(&self) -> bool {
        matches!(self, TokenType::Meme)
    }
}

impl Default for TokenType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl FromStr for TokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "meme" | "memecoin" => Ok(TokenType::Meme),
            "defi" => Ok(TokenType::Defi),
            "nft" => Ok(TokenType::Nft),
            "gaming" | "game" => Ok(TokenType::Gaming),
            "ai" => Ok(TokenType::Ai),
            "new" => Ok(TokenType::New),
            "exchange" | "cex" | "dex" => Ok(TokenType::Exchange),
            "stable" | "stablecoin" => Ok(TokenType::Stable),
            "unknown" | "" => Ok(TokenType::Unknown),
            other => Err(format!("unknown token type: {}", other)),
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenType::Meme => "meme",
            TokenType::Defi => "defi",
            TokenType::Nft => "nft",
            TokenType::Gaming => "gaming",
            TokenType::Ai => "ai",
            TokenType::New => "new",
            TokenType::Exchange => "exchange",
            TokenType::Stable => "stable",
            TokenType::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Market snapshot returned by the market-data provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub price: f64,
    pub market_cap: f64,
    pub volume_1h: f64,
    /// Fractional growth, 0.10 = +10%
    pub volume_growth_5m: f64,
    pub volume_growth_1h: f64,
    pub liquidity: Option<f64>,
    pub token_type: Option<TokenType>,
}

/// Signal grade derived from confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalLevel {
    S,
    A,
    B,
    C,
    D,
}

impl SignalLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            SignalLevel::S
        } else if confidence >= 0.8 {
            SignalLevel::A
        } else if confidence >= 0.6 {
            SignalLevel::B
        } else if confidence >= 0.3 {
            SignalLevel::C
        } else {
            SignalLevel::D
        }
    }
}

impl fmt::Display for SignalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Emitted signal. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub token: String,
    /// Final (possibly ML-blended) confidence in [0, 1]
    pub confidence: f64,
    pub rule_confidence: f64,
    pub ml_probability: Option<f64>,
    pub level: SignalLevel,
    pub trader_count: usize,
    pub traders: Vec<String>,
    pub high_quality_traders: usize,
    pub elite_traders: usize,
    pub initial_price: f64,
    pub market_cap: f64,
    pub volume_1h: f64,
    pub usd_total: f64,
    pub buys: u32,
    pub sells: u32,
    pub token_type: TokenType,
    pub whale_activity: bool,
    pub created_at: i64,
}

/// Forward horizon at which signal performance is sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M3,
    M5,
    M10,
    M30,
    H1,
    H2,
    H4,
    H24,
}

impl Timeframe {
    /// All horizons in ascending order
    pub const ALL: [Timeframe; 8] = [
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M10,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::H24,
    ];

    /// Offset from signal registration
    pub fn offset(&self) -> Duration {
        let minutes = match self {
            Timeframe::M3 => 3,
            Timeframe::M5 => 5,
            Timeframe::M10 => 10,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H2 => 120,
            Timeframe::H4 => 240,
            Timeframe::H24 => 1440,
        };
        Duration::from_secs(minutes * 60)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M10 => "10m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H24 => "24h",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One observation of a signal at one horizon. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub signal_id: String,
    pub token: String,
    pub timeframe: Timeframe,
    pub price: f64,
    pub percent_change: f64,
    /// Best gain seen up to and including this observation
    pub max_gain: f64,
    pub confidence: f64,
    pub traders_count: usize,
    pub observed_at: i64,
}
