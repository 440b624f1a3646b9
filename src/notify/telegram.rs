//! Telegram Bot API notifier

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::Notifier;
use crate::config::TelegramConfig;
use crate::error::{Error, Result};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Telegram rejects longer messages
pub const MAX_MESSAGE_CHARS: usize = 4096;
const TRUNCATION_SUFFIX: &str = "\n[truncated]";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.bot_token.is_empty() || config.chat_id.is_empty() {
            return Err(Error::Config("Telegram bot_token and chat_id are required".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }

    async fn send_once(&self, text: &str) -> std::result::Result<(), backoff::Error<Error>> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API, self.bot_token);
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: true,
        };

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| backoff::Error::transient(Error::Notifier(e.to_string())))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = resp.text().await.unwrap_or_default();
        let err = Error::Notifier(format!("Telegram returned {}: {}", status, detail));
        if status.is_server_error() || status.as_u16() == 429 {
            warn!(status = %status, "Retryable Telegram error");
            Err(backoff::Error::transient(err))
        } else {
            Err(backoff::Error::permanent(err))
        }
    }
}

/// Cut a message to Telegram's limit on a char boundary
pub fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_MESSAGE_CHARS {
        return message.to_string();
    }
    let keep = MAX_MESSAGE_CHARS - TRUNCATION_SUFFIX.chars().count();
    let mut truncated: String = message.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_alert(&self, message: &str) -> Result<()> {
        let text = truncate_message(message);
        if text.len() != message.len() {
            warn!(original_len = message.len(), "Telegram message truncated");
        }

        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_secs(2),
            current_interval: Duration::from_secs(2),
            multiplier: 2.0,
            max_interval: Duration::from_secs(8),
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || self.send_once(&text)).await?;
        debug!("Telegram alert delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_untouched() {
        assert_eq!(truncate_message("hello"), "hello");
    }

    #[test]
    fn test_truncation_respects_limit() {
        let long = "é".repeat(5000);
        let truncated = truncate_message(&long);
        assert_eq!(truncated.chars().count(), MAX_MESSAGE_CHARS);
        assert!(truncated.ends_with("[truncated]"));
    }

    #[test]
    fn test_requires_credentials() {
        assert!(TelegramNotifier::new(&TelegramConfig::default()).is_err());
    }
}
