//! Candidate scoring

pub mod confidence;
pub mod whale;

pub use confidence::{compute_confidence, confidence_breakdown, ConfidenceBreakdown, ConfidenceInputs};
pub use whale::{detect_whale_activity, whale_threshold, WhaleReport};
