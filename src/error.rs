//! Error types for the signal engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the signal engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Feed errors
    #[error("Feed connection failed: {0}")]
    FeedConnection(String),

    #[error("Feed disconnected: {0}")]
    FeedDisconnected(String),

    #[error("Feed {source_name} exhausted {attempts} reconnect attempts")]
    FeedExhausted { source_name: String, attempts: u32 },

    // Collaborator errors
    #[error("Market data unavailable for {token}: {reason}")]
    MarketData { token: String, reason: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Notifier error: {0}")]
    Notifier(String),

    #[error("Safety check failed: {0}")]
    Safety(String),

    #[error("Success estimator error: {0}")]
    Estimator(String),

    #[error("Reputation backend error: {0}")]
    Reputation(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::FeedConnection(_)
                | Error::FeedDisconnected(_)
                | Error::MarketData { .. }
                | Error::Notifier(_)
                | Error::Store(_)
        )
    }

    /// Check if this error must stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::FeedExhausted { .. } | Error::Config(_))
    }

    pub fn market_data(token: &str, reason: impl ToString) -> Self {
        Error::MarketData {
            token: token.to_string(),
            reason: reason.to_string(),
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Conversion from HTTP client errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::market_data("T1", "timeout").is_retryable());
        assert!(Error::FeedDisconnected("closed".into()).is_retryable());
        assert!(!Error::Config("bad".into()).is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        let err = Error::FeedExhausted {
            source_name: "primary".into(),
            attempts: 10,
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("primary"));
        assert!(!Error::Store("down".into()).is_fatal());
    }
}
