//! Configuration loading and validation
//!
//! Every recognized option lives in one of the sections below. The config is
//! resolved once at startup and handed to each component by reference.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub reputation: ReputationConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub feeds: Vec<FeedSourceConfig>,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Wallets watched on every feed
    #[serde(default)]
    pub wallets: Vec<String>,
}

/// Transaction intake and deduplication
#[derive(Debug, Clone, Deserialize)]
pub struct IntakeConfig {
    /// Transactions below this USD value are rejected
    #[serde(default = "default_min_transaction_usd")]
    pub min_transaction_usd: f64,
    /// A dedup key stays live for this long (seconds)
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
    /// Minimum gap between dedup sweeps (seconds)
    #[serde(default = "default_cleanup_interval_secs")]
    pub dedup_cleanup_interval_secs: u64,
    /// Capacity of the feed -> engine channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_min_transaction_usd() -> f64 { 200.0 }
fn default_dedup_ttl_secs() -> u64 { 3600 }
fn default_cleanup_interval_secs() -> u64 { 300 }
fn default_channel_capacity() -> usize { 10_000 }

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            min_transaction_usd: default_min_transaction_usd(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            dedup_cleanup_interval_secs: default_cleanup_interval_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Candidate window bookkeeping
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// Candidates inactive longer than this are evicted (seconds)
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    /// Minimum gap between candidate sweeps (seconds)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Wallet transactions per window above which USD credit is discounted
    #[serde(default = "default_high_activity_threshold")]
    pub high_activity_threshold: usize,
    /// Trailing window for the wallet activity count (seconds)
    #[serde(default = "default_high_activity_window_secs")]
    pub high_activity_window_secs: u64,
    /// Fraction of USD credited for high-activity wallets
    #[serde(default = "default_high_activity_discount")]
    pub high_activity_discount: f64,
    /// How long a signaled token ignores new transactions (seconds)
    #[serde(default = "default_max_age_secs")]
    pub resignal_cooldown_secs: u64,
    /// How long a token flagged unsafe is ignored (seconds)
    #[serde(default = "default_failed_token_ttl_secs")]
    pub failed_token_ttl_secs: u64,
}

fn default_max_age_secs() -> u64 { 3600 }
fn default_high_activity_threshold() -> usize { 20 }
fn default_high_activity_window_secs() -> u64 { 3600 }
fn default_high_activity_discount() -> f64 { 0.5 }
fn default_failed_token_ttl_secs() -> u64 { 86_400 }

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            high_activity_threshold: default_high_activity_threshold(),
            high_activity_window_secs: default_high_activity_window_secs(),
            high_activity_discount: default_high_activity_discount(),
            resignal_cooldown_secs: default_max_age_secs(),
            failed_token_ttl_secs: default_failed_token_ttl_secs(),
        }
    }
}

/// Signal qualification gates and throttling
#[derive(Debug, Clone, Deserialize)]
pub struct SignalConfig {
    /// Evaluation loop period (seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Minimum age of a candidate before it can signal (seconds)
    #[serde(default = "default_signal_window_secs")]
    pub signal_window_secs: u64,
    #[serde(default = "default_min_traders")]
    pub min_traders: usize,
    /// Tail of the signal window checked for recent activity
    #[serde(default = "default_recent_activity_fraction")]
    pub recent_activity_fraction: f64,
    #[serde(default = "default_min_recent_transactions")]
    pub min_recent_transactions: usize,
    #[serde(default = "default_min_volume_usd")]
    pub min_volume_usd: f64,
    /// 0.05 = 5% five-minute volume growth
    #[serde(default = "default_min_volume_growth_5m")]
    pub min_volume_growth_5m: f64,
    /// Wallet score counted as high quality
    #[serde(default = "default_high_quality_score")]
    pub high_quality_score: f64,
    /// Trader count that waives the high-quality requirement
    #[serde(default = "default_min_traders_without_quality")]
    pub min_traders_without_quality: usize,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Rolling one-hour emission cap
    #[serde(default = "default_max_signals_per_hour")]
    pub max_signals_per_hour: usize,
    /// Weight of the ML estimate in the blended confidence
    #[serde(default = "default_ml_weight")]
    pub ml_weight: f64,
    /// Score passed to the safety oracle
    #[serde(default = "default_safety_min_score")]
    pub safety_min_score: f64,
}

fn default_poll_interval_secs() -> u64 { 30 }
fn default_signal_window_secs() -> u64 { 540 }
fn default_min_traders() -> usize { 2 }
fn default_recent_activity_fraction() -> f64 { 0.2 }
fn default_min_recent_transactions() -> usize { 2 }
fn default_min_volume_usd() -> f64 { 2000.0 }
fn default_min_volume_growth_5m() -> f64 { 0.05 }
fn default_high_quality_score() -> f64 { 7.0 }
fn default_min_traders_without_quality() -> usize { 5 }
fn default_min_confidence() -> f64 { 0.3 }
fn default_max_signals_per_hour() -> usize { 10 }
fn default_ml_weight() -> f64 { 0.3 }
fn default_safety_min_score() -> f64 { 50.0 }

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            signal_window_secs: default_signal_window_secs(),
            min_traders: default_min_traders(),
            recent_activity_fraction: default_recent_activity_fraction(),
            min_recent_transactions: default_min_recent_transactions(),
            min_volume_usd: default_min_volume_usd(),
            min_volume_growth_5m: default_min_volume_growth_5m(),
            high_quality_score: default_high_quality_score(),
            min_traders_without_quality: default_min_traders_without_quality(),
            min_confidence: default_min_confidence(),
            max_signals_per_hour: default_max_signals_per_hour(),
            ml_weight: default_ml_weight(),
            safety_min_score: default_safety_min_score(),
        }
    }
}

impl SignalConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Confidence scorer inputs that are not per-call
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// volume_1h at which the volume component saturates
    #[serde(default = "default_high_volume_threshold")]
    pub high_volume_threshold: f64,
    /// Floor for a whale transaction in USD
    #[serde(default = "default_min_whale_usd")]
    pub min_whale_usd: f64,
}

fn default_high_volume_threshold() -> f64 { 5000.0 }
fn default_min_whale_usd() -> f64 { 5000.0 }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            high_volume_threshold: default_high_volume_threshold(),
            min_whale_usd: default_min_whale_usd(),
        }
    }
}

/// Wallet reputation cache
#[derive(Debug, Clone, Deserialize)]
pub struct ReputationConfig {
    /// Score for wallets with no persisted reputation
    #[serde(default = "default_wallet_score")]
    pub default_score: f64,
    #[serde(default = "default_max_booster_multiplier")]
    pub max_booster_multiplier: f64,
    #[serde(default = "default_buy_increment")]
    pub buy_increment: f64,
    #[serde(default = "default_sell_increment")]
    pub sell_increment: f64,
}

fn default_wallet_score() -> f64 { 5.0 }
fn default_max_booster_multiplier() -> f64 { 3.0 }
fn default_buy_increment() -> f64 { 0.1 }
fn default_sell_increment() -> f64 { 0.2 }

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            default_score: default_wallet_score(),
            max_booster_multiplier: default_max_booster_multiplier(),
            buy_increment: default_buy_increment(),
            sell_increment: default_sell_increment(),
        }
    }
}

/// Performance tracking
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Send a notifier message for each horizon report
    #[serde(default = "default_true")]
    pub notify_reports: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            notify_reports: true,
        }
    }
}

/// One upstream transaction feed
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSourceConfig {
    pub name: String,
    pub ws_url: String,
    /// Method name of the wallet subscription message
    #[serde(default = "default_subscribe_method")]
    pub subscribe_method: String,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

fn default_subscribe_method() -> String {
    "subscribeWallets".to_string()
}

fn default_ping_interval_secs() -> u64 { 30 }

/// Source health checking
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Silence longer than this marks the source unhealthy (seconds)
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

fn default_health_check_interval_secs() -> u64 { 60 }
fn default_source_timeout_secs() -> u64 { 300 }
fn default_max_failures() -> u32 { 3 }

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_health_check_interval_secs(),
            source_timeout_secs: default_source_timeout_secs(),
            max_failures: default_max_failures(),
        }
    }
}

/// Feed reconnection backoff
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
    /// Jitter: 0.5 spreads each delay over [0.5x, 1.5x]
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_attempts: u32,
}

fn default_initial_delay_ms() -> u64 { 1000 }
fn default_max_delay_ms() -> u64 { 60_000 }
fn default_backoff_multiplier() -> f64 { 2.0 }
fn default_randomization_factor() -> f64 { 0.5 }
fn default_max_reconnect_attempts() -> u32 { 10 }

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_backoff_multiplier(),
            randomization_factor: default_randomization_factor(),
            max_attempts: default_max_reconnect_attempts(),
        }
    }
}

/// Market data provider (DexScreener)
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_dexscreener_url")]
    pub base_url: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    #[serde(default = "default_market_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_dexscreener_url() -> String {
    "https://api.dexscreener.com".to_string()
}

fn default_chain_id() -> String {
    "solana".to_string()
}

fn default_market_timeout_ms() -> u64 { 10_000 }

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: default_dexscreener_url(),
            chain_id: default_chain_id(),
            timeout_ms: default_market_timeout_ms(),
        }
    }
}

/// Telegram alert channel
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SMARTFLOW__)
            .add_source(
                config::Environment::with_prefix("SMARTFLOW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.intake.min_transaction_usd < 0.0 {
            anyhow::bail!("min_transaction_usd cannot be negative");
        }

        if self.intake.dedup_ttl_secs == 0 {
            anyhow::bail!("dedup_ttl_secs must be positive");
        }

        if self.intake.dedup_cleanup_interval_secs == 0 {
            anyhow::bail!("dedup_cleanup_interval_secs must be positive");
        }

        if self.intake.channel_capacity == 0 {
            anyhow::bail!("channel_capacity must be at least 1");
        }

        if self.aggregator.cleanup_interval_secs == 0 {
            anyhow::bail!("aggregator.cleanup_interval_secs must be positive");
        }

        if self.health.check_interval_secs == 0 {
            anyhow::bail!("health.check_interval_secs must be positive");
        }

        if self.signal.min_traders == 0 {
            anyhow::bail!("min_traders must be at least 1");
        }

        if self.signal.max_signals_per_hour == 0 {
            anyhow::bail!("max_signals_per_hour must be at least 1");
        }

        if self.signal.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be positive");
        }

        if !(0.0..=1.0).contains(&self.signal.ml_weight) {
            anyhow::bail!("ml_weight must be between 0 and 1");
        }

        if !(0.0..=1.0).contains(&self.signal.min_confidence) {
            anyhow::bail!("min_confidence must be between 0 and 1");
        }

        if self.signal.recent_activity_fraction <= 0.0 || self.signal.recent_activity_fraction > 1.0 {
            anyhow::bail!("recent_activity_fraction must be in (0, 1]");
        }

        if self.aggregator.high_activity_discount <= 0.0 || self.aggregator.high_activity_discount > 1.0 {
            anyhow::bail!("high_activity_discount must be in (0, 1]");
        }

        if !(0.0..=10.0).contains(&self.reputation.default_score) {
            anyhow::bail!("default_score must be between 0 and 10");
        }

        if self.reputation.max_booster_multiplier < 1.0 {
            anyhow::bail!("max_booster_multiplier must be at least 1.0");
        }

        for feed in &self.feeds {
            url::Url::parse(&feed.ws_url)
                .with_context(|| format!("Invalid ws_url for feed {}: {}", feed.name, feed.ws_url))?;
            if feed.ping_interval_secs == 0 {
                anyhow::bail!("ping_interval_secs must be positive for feed {}", feed.name);
            }
        }

        if self.reconnect.max_attempts == 0 {
            anyhow::bail!("reconnect.max_attempts must be at least 1");
        }

        if self.telegram.enabled && (self.telegram.bot_token.is_empty() || self.telegram.chat_id.is_empty()) {
            anyhow::bail!("telegram.enabled requires bot_token and chat_id");
        }

        if self.feeds.is_empty() {
            tracing::warn!("No feeds configured - the engine will not receive transactions");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let feeds: Vec<String> = self
            .feeds
            .iter()
            .map(|f| format!("{} ({})", f.name, mask_url(&f.ws_url)))
            .collect();

        format!(
            r#"Configuration:
  Intake:
    min_transaction: ${}
    dedup_ttl: {}s
  Aggregator:
    max_age: {}s
    high_activity_threshold: {} tx/{}s
  Signal:
    window: {}s
    min_traders: {}
    min_volume: ${}
    min_confidence: {}
    max_per_hour: {}
  Feeds: {:?}
  Wallets: {}
  Market:
    base_url: {}
  Telegram:
    enabled: {}
    bot_token: {}
"#,
            self.intake.min_transaction_usd,
            self.intake.dedup_ttl_secs,
            self.aggregator.max_age_secs,
            self.aggregator.high_activity_threshold,
            self.aggregator.high_activity_window_secs,
            self.signal.signal_window_secs,
            self.signal.min_traders,
            self.signal.min_volume_usd,
            self.signal.min_confidence,
            self.signal.max_signals_per_hour,
            feeds,
            self.wallets.len(),
            self.market.base_url,
            self.telegram.enabled,
            if self.telegram.bot_token.is_empty() {
                "(not set)"
            } else {
                "***"
            },
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            intake: IntakeConfig::default(),
            aggregator: AggregatorConfig::default(),
            signal: SignalConfig::default(),
            scoring: ScoringConfig::default(),
            reputation: ReputationConfig::default(),
            tracker: TrackerConfig::default(),
            feeds: vec![],
            health: HealthConfig::default(),
            reconnect: ReconnectConfig::default(),
            market: MarketConfig::default(),
            telegram: TelegramConfig::default(),
            wallets: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.signal.signal_window_secs, 540);
        assert_eq!(config.signal.max_signals_per_hour, 10);
        assert_eq!(config.aggregator.high_activity_threshold, 20);
        assert_eq!(config.intake.min_transaction_usd, 200.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
wallets = ["W1", "W2"]

[signal]
min_traders = 3
max_signals_per_hour = 4

[[feeds]]
name = "primary"
ws_url = "wss://feed.example.com/ws?key=secret"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.signal.min_traders, 3);
        assert_eq!(config.signal.max_signals_per_hour, 4);
        // Untouched sections keep their defaults
        assert_eq!(config.signal.signal_window_secs, 540);
        assert_eq!(config.feeds.len(), 1);
        assert_eq!(config.feeds[0].subscribe_method, "subscribeWallets");
        assert_eq!(config.wallets.len(), 2);
        assert!(!config.masked_display().contains("secret"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.signal.ml_weight = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.telegram.enabled = true;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.feeds.push(FeedSourceConfig {
            name: "bad".into(),
            ws_url: "not a url".into(),
            subscribe_method: default_subscribe_method(),
            ping_interval_secs: 30,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let cases: [fn(&mut Config); 5] = [
            |c| c.aggregator.cleanup_interval_secs = 0,
            |c| c.intake.dedup_cleanup_interval_secs = 0,
            |c| c.intake.channel_capacity = 0,
            |c| c.health.check_interval_secs = 0,
            |c| {
                c.feeds.push(FeedSourceConfig {
                    name: "primary".into(),
                    ws_url: "wss://feed.example.com/ws".into(),
                    subscribe_method: default_subscribe_method(),
                    ping_interval_secs: 0,
                })
            },
        ];

        for (i, zero_out) in cases.iter().enumerate() {
            let mut config = Config::default();
            zero_out(&mut config);
            assert!(config.validate().is_err(), "case {} accepted", i);
        }
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("wss://feed.example.com?key=secret"),
            "wss://feed.example.com?***"
        );
        assert_eq!(mask_url("wss://feed.example.com"), "wss://feed.example.com");
    }
}
