//! Per-token rolling window

use serde::Serialize;
use std::collections::BTreeSet;

use crate::types::{TransactionEvent, TxType};

/// A transaction as recorded inside a candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateTransaction {
    pub wallet: String,
    pub tx_type: TxType,
    /// USD credited to the candidate after the wallet-activity discount
    pub amount_usd: f64,
    /// USD amount as reported by the feed
    pub raw_amount_usd: f64,
    pub timestamp: i64,
}

/// Token under observation, not yet a signal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenCandidate {
    pub token: String,
    pub traders: BTreeSet<String>,
    pub transactions: Vec<CandidateTransaction>,
    pub first_seen: i64,
    pub last_seen: i64,
    pub usd_total: f64,
    pub buys: u32,
    pub sells: u32,
}

impl TokenCandidate {
    pub fn new(token: &str, first_seen: i64) -> Self {
        Self {
            token: token.to_string(),
            traders: BTreeSet::new(),
            transactions: Vec::new(),
            first_seen,
            last_seen: first_seen,
            usd_total: 0.0,
            buys: 0,
            sells: 0,
        }
    }

    pub(crate) fn record(&mut self, event: &TransactionEvent, credited_usd: f64) {
        self.traders.insert(event.wallet.clone());
        self.transactions.push(CandidateTransaction {
            wallet: event.wallet.clone(),
            tx_type: event.tx_type,
            amount_usd: credited_usd,
            raw_amount_usd: event.amount_usd,
            timestamp: event.timestamp,
        });
        self.last_seen = self.last_seen.max(event.timestamp);
        self.usd_total += credited_usd;
        match event.tx_type {
            TxType::Buy => self.buys += 1,
            TxType::Sell => self.sells += 1,
        }
    }

    pub fn trader_count(&self) -> usize {
        self.traders.len()
    }

    /// Seconds since the first transaction
    pub fn age(&self, now: i64) -> i64 {
        now - self.first_seen
    }

    /// Transactions strictly newer than `since`
    pub fn recent_transactions(&self, since: i64) -> usize {
        self.transactions.iter().filter(|tx| tx.timestamp > since).count()
    }

    /// Evaluation priority, higher first
    pub fn priority(&self) -> f64 {
        self.trader_count() as f64 * self.usd_total
    }

    pub fn buy_sell_ratio(&self) -> f64 {
        let total = self.buys + self.sells;
        self.buys as f64 / total.max(1) as f64
    }

    /// Transactions per minute since first seen
    pub fn tx_velocity(&self, now: i64) -> f64 {
        let minutes = (self.age(now) as f64 / 60.0).max(1.0);
        self.transactions.len() as f64 / minutes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(wallet: &str, tx_type: TxType, amount: f64, ts: i64) -> TransactionEvent {
        TransactionEvent {
            wallet: wallet.into(),
            token: "T1".into(),
            tx_type,
            amount_usd: amount,
            timestamp: ts,
            source: "test".into(),
        }
    }

    #[test]
    fn test_record_updates_counters() {
        let mut candidate = TokenCandidate::new("T1", 100);
        candidate.record(&event("W1", TxType::Buy, 300.0, 100), 300.0);
        candidate.record(&event("W1", TxType::Sell, 200.0, 160), 100.0);
        candidate.record(&event("W2", TxType::Buy, 500.0, 130), 500.0);

        assert_eq!(candidate.trader_count(), 2);
        assert_eq!(candidate.buys, 2);
        assert_eq!(candidate.sells, 1);
        assert_eq!(candidate.usd_total, 900.0);
        assert_eq!(candidate.last_seen, 160);
        assert_eq!(candidate.transactions[1].raw_amount_usd, 200.0);
        assert_eq!(candidate.recent_transactions(129), 2);
        assert_eq!(candidate.priority(), 1800.0);
    }
}
