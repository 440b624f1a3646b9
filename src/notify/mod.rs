//! Alert delivery
//!
//! Delivery is at-least-once and best effort: callers log a failed send and move on.

pub mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::types::{PerformanceRecord, Signal};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_alert(&self, message: &str) -> Result<()>;
}

/// Writes alerts to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_alert(&self, message: &str) -> Result<()> {
        info!(target: "smartflow::alert", "{}", message);
        Ok(())
    }
}

/// Shorten a wallet for display, `ABCDEFGH...UVWXYZ`
pub fn short_wallet(wallet: &str) -> String {
    let chars: Vec<char> = wallet.chars().collect();
    if chars.len() <= 14 {
        return wallet.to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("{}...{}", head, tail)
}

fn format_usd(value: f64) -> String {
    if value > 0.0 {
        format!("${:.2}", value)
    } else {
        "unknown".to_string()
    }
}

pub fn format_signal_alert(signal: &Signal) -> String {
    let traders = signal
        .traders
        .iter()
        .map(|w| format!("`{}`", short_wallet(w)))
        .collect::<Vec<_>>()
        .join(", ");

    let ml = signal
        .ml_probability
        .map(|p| format!("\nML probability: *{:.1}%*", p * 100.0))
        .unwrap_or_default();

    let whale = if signal.whale_activity { "\nWhale activity detected" } else { "" };

    format!(
        "*SIGNAL {level}* `{id}`\n\
         Token: `{token}`\n\
         Confidence: *{confidence:.1}%* (rules {rule:.1}%){ml}\n\
         Type: {token_type}\n\
         Traders ({count}, {hq} high quality, {elite} elite): {traders}\n\
         Flow: {usd} over {buys} buys / {sells} sells\n\
         Volume 1h: {volume} | Market cap: {mcap}\n\
         Price: {price}{whale}\n\
         https://dexscreener.com/solana/{token}",
        level = signal.level,
        id = signal.id,
        token = signal.token,
        confidence = signal.confidence * 100.0,
        rule = signal.rule_confidence * 100.0,
        ml = ml,
        token_type = signal.token_type,
        count = signal.trader_count,
        hq = signal.high_quality_traders,
        elite = signal.elite_traders,
        traders = traders,
        usd = format_usd(signal.usd_total),
        buys = signal.buys,
        sells = signal.sells,
        volume = format_usd(signal.volume_1h),
        mcap = format_usd(signal.market_cap),
        price = format_usd(signal.initial_price),
        whale = whale,
    )
}

pub fn format_performance_report(record: &PerformanceRecord) -> String {
    let direction = if record.percent_change >= 0.0 { "UP" } else { "DOWN" };
    format!(
        "*{timeframe} update* `{id}` {direction}\n\
         Token: `{token}`\n\
         Change: *{change:+.2}%* | Max gain: {max_gain:+.2}%\n\
         Price: {price}\n\
         Confidence at signal: {confidence:.1}% | Traders: {traders}",
        timeframe = record.timeframe,
        id = record.signal_id,
        direction = direction,
        token = record.token,
        change = record.percent_change,
        max_gain = record.max_gain,
        price = format_usd(record.price),
        confidence = record.confidence * 100.0,
        traders = record.traders_count,
    )
}

pub fn format_fatal(source: &str, reason: &str) -> String {
    format!("*FATAL* feed `{}` lost: {}\nSignal engine is stopping.", source, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SignalLevel, Timeframe, TokenType};

    #[test]
    fn test_short_wallet() {
        assert_eq!(short_wallet("short"), "short");
        assert_eq!(
            short_wallet("ABCDEFGHIJKLMNOPQRSTUVWXYZ"),
            "ABCDEFGH...UVWXYZ"
        );
    }

    #[test]
    fn test_signal_alert_contents() {
        let signal = Signal {
            id: "A1B2C3D4".into(),
            token: "T1".into(),
            confidence: 0.72,
            rule_confidence: 0.65,
            ml_probability: Some(0.88),
            level: SignalLevel::B,
            trader_count: 2,
            traders: vec!["W1".into(), "W2".into()],
            high_quality_traders: 1,
            elite_traders: 0,
            initial_price: 0.5,
            market_cap: 0.0,
            volume_1h: 12_000.0,
            usd_total: 650.0,
            buys: 2,
            sells: 0,
            token_type: TokenType::Meme,
            whale_activity: true,
            created_at: 0,
        };

        let text = format_signal_alert(&signal);
        assert!(text.contains("*SIGNAL B* `A1B2C3D4`"));
        assert!(text.contains("72.0%"));
        assert!(text.contains("ML probability: *88.0%*"));
        assert!(text.contains("Market cap: unknown"));
        assert!(text.contains("Whale activity"));
    }

    #[test]
    fn test_performance_report() {
        let record = PerformanceRecord {
            signal_id: "S1".into(),
            token: "T1".into(),
            timeframe: Timeframe::M3,
            price: 1.2,
            percent_change: 20.0,
            max_gain: 20.0,
            confidence: 0.7,
            traders_count: 3,
            observed_at: 180,
        };
        let text = format_performance_report(&record);
        assert!(text.starts_with("*3m update* `S1` UP"));
        assert!(text.contains("+20.00%"));
    }
}
