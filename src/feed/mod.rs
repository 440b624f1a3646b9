//! Upstream transaction feeds
//!
//! Each configured source gets a [`FeedClient`] and a health monitor. Clients
//! push [`FeedEvent`]s into one channel consumed by the engine.

pub mod connection;
pub mod health;

pub use connection::{reconnect_backoff, FeedClient, SubscriptionMessage};
pub use health::{spawn_health_monitor, HealthVerdict, SharedHealth, SourceHealth};

/// Event emitted by a feed client
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Connected { source: String },
    /// Raw text frame
    Message { source: String, text: String },
    Disconnected { source: String, reason: String },
    /// Reconnect attempts exhausted, the process must stop
    Fatal { source: String, reason: String },
}
