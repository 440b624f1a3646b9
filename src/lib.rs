//! Smartflow Signal Engine Library
//!
//! Watches trading activity of tracked wallets, spots tokens that several
//! reputable wallets buy within a short window, scores them and emits graded
//! buy signals whose price performance is tracked afterwards.

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod feed;
pub mod intake;
pub mod market;
pub mod notify;
pub mod reputation;
pub mod scoring;
pub mod store;
pub mod tracker;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use engine::{Collaborators, SignalEngine};
pub use error::{Error, Result};
