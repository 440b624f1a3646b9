//! Raw feed payload normalization
//!
//! Two payload shapes are understood:
//! - flat: `{"wallet", "token", "type"|"direction", "amount_usd"|"value_usd", "timestamp"?}`
//! - action envelope: `{"data": {"wallet", "actions": [{"type": "swap"|"transfer", "mint", "usdValue", ...}]}}`

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;

use crate::types::{TransactionEvent, TxType};

/// Why a raw payload did not become a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum Rejected {
    /// Not parseable or missing a required field
    Malformed(String),
    /// Valid but worth less than the configured minimum
    BelowMinimum { amount_usd: f64, minimum: f64 },
    /// Keep-alive frame, nothing to process
    Heartbeat,
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejected::Malformed(reason) => write!(f, "malformed: {}", reason),
            Rejected::BelowMinimum { amount_usd, minimum } => {
                write!(f, "below minimum: ${:.2} < ${:.2}", amount_usd, minimum)
            }
            Rejected::Heartbeat => write!(f, "heartbeat"),
        }
    }
}

/// Accepts numbers or numeric strings
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct FlatPayload {
    #[serde(default)]
    wallet: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    amount_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    value_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    timestamp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ActionEnvelope {
    data: ActionData,
}

#[derive(Debug, Deserialize)]
struct ActionData {
    #[serde(default)]
    wallet: Option<String>,
    #[serde(default)]
    actions: Vec<Action>,
    #[serde(default, deserialize_with = "lenient_f64")]
    timestamp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Action {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    mint: Option<String>,
    #[serde(default, rename = "usdValue", deserialize_with = "lenient_f64")]
    usd_value: Option<f64>,
    #[serde(default, rename = "in")]
    input: Option<ActionLeg>,
    #[serde(default)]
    out: Option<ActionLeg>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    destination: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActionLeg {
    #[serde(default)]
    mint: Option<String>,
}

/// Converts raw feed payloads into [`TransactionEvent`]s
#[derive(Debug, Clone)]
pub struct Normalizer {
    min_transaction_usd: f64,
}

impl Normalizer {
    pub fn new(min_transaction_usd: f64) -> Self {
        Self { min_transaction_usd }
    }

    /// Normalize a text frame
    pub fn normalize_text(&self, text: &str, source: &str, now: i64) -> Result<TransactionEvent, Rejected> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Rejected::Malformed(format!("invalid JSON: {}", e)))?;
        self.normalize(&value, source, now)
    }

    /// Normalize an already-parsed payload
    pub fn normalize(&self, raw: &Value, source: &str, now: i64) -> Result<TransactionEvent, Rejected> {
        if !raw.is_object() {
            return Err(Rejected::Malformed("payload is not an object".into()));
        }

        if is_heartbeat(raw) {
            return Err(Rejected::Heartbeat);
        }

        let event = if raw.get("data").and_then(|d| d.get("actions")).is_some() {
            let envelope: ActionEnvelope = serde_json::from_value(raw.clone())
                .map_err(|e| Rejected::Malformed(e.to_string()))?;
            Self::from_envelope(envelope, source, now)?
        } else {
            let flat: FlatPayload = serde_json::from_value(raw.clone())
                .map_err(|e| Rejected::Malformed(e.to_string()))?;
            Self::from_flat(flat, source, now)?
        };

        if event.amount_usd < self.min_transaction_usd {
            return Err(Rejected::BelowMinimum {
                amount_usd: event.amount_usd,
                minimum: self.min_transaction_usd,
            });
        }

        Ok(event)
    }

    fn from_flat(flat: FlatPayload, source: &str, now: i64) -> Result<TransactionEvent, Rejected> {
        let wallet = required(flat.wallet, "wallet")?;
        let token = required(flat.token, "token")?;

        let tx_type = match flat.kind.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("BUY") => TxType::Buy,
            Some("SELL") => TxType::Sell,
            _ => match flat.direction.as_deref().map(str::to_ascii_uppercase).as_deref() {
                Some("IN") => TxType::Buy,
                Some("OUT") => TxType::Sell,
                _ => return Err(Rejected::Malformed("unknown transaction direction".into())),
            },
        };

        let amount_usd = flat
            .amount_usd
            .or(flat.value_usd)
            .ok_or_else(|| Rejected::Malformed("missing amount".into()))?;

        Ok(TransactionEvent {
            wallet,
            token,
            tx_type,
            amount_usd: validate_amount(amount_usd)?,
            timestamp: normalize_timestamp(flat.timestamp, now),
            source: source.to_string(),
        })
    }

    fn from_envelope(envelope: ActionEnvelope, source: &str, now: i64) -> Result<TransactionEvent, Rejected> {
        let data = envelope.data;
        let wallet = required(data.wallet, "wallet")?;

        let action = data
            .actions
            .into_iter()
            .find(|a| a.kind.eq_ignore_ascii_case("swap") || a.kind.eq_ignore_ascii_case("transfer"))
            .ok_or_else(|| Rejected::Malformed("no swap or transfer action".into()))?;

        let token = required(action.mint.clone(), "mint")?;

        let tx_type = if action.kind.eq_ignore_ascii_case("swap") {
            let in_mint = action.input.as_ref().and_then(|l| l.mint.as_deref());
            let out_mint = action.out.as_ref().and_then(|l| l.mint.as_deref());
            if in_mint == Some(token.as_str()) {
                TxType::Buy
            } else if out_mint == Some(token.as_str()) {
                TxType::Sell
            } else {
                return Err(Rejected::Malformed("swap does not involve its mint".into()));
            }
        } else if action.destination.as_deref() == Some(wallet.as_str()) {
            TxType::Buy
        } else if action.source.as_deref() == Some(wallet.as_str()) {
            TxType::Sell
        } else {
            return Err(Rejected::Malformed("transfer does not involve the wallet".into()));
        };

        let amount_usd = action
            .usd_value
            .ok_or_else(|| Rejected::Malformed("missing usdValue".into()))?;

        Ok(TransactionEvent {
            wallet,
            token,
            tx_type,
            amount_usd: validate_amount(amount_usd)?,
            timestamp: normalize_timestamp(data.timestamp, now),
            source: source.to_string(),
        })
    }
}

fn is_heartbeat(raw: &Value) -> bool {
    matches!(
        raw.get("type").and_then(Value::as_str).map(str::to_ascii_lowercase).as_deref(),
        Some("pong") | Some("ping") | Some("heartbeat")
    )
}

fn required(value: Option<String>, field: &str) -> Result<String, Rejected> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Rejected::Malformed(format!("missing {}", field))),
    }
}

fn validate_amount(amount: f64) -> Result<f64, Rejected> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(amount)
    } else {
        Err(Rejected::Malformed(format!("invalid amount {}", amount)))
    }
}

/// Seconds since epoch; millisecond stamps are scaled down
fn normalize_timestamp(ts: Option<f64>, now: i64) -> i64 {
    match ts {
        Some(t) if t.is_finite() && t > 1e12 => (t / 1000.0) as i64,
        Some(t) if t.is_finite() && t > 0.0 => t as i64,
        _ => now,
    }
}
