//! Core domain state
//!
//! All models use strict 64-bit integer arithmetic and are shaped for the
//! sequencer's single-writer hot path: hot fields first, copies handed
//! out to everyone else.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::quant::{PriceMicros, QtySats, Seq, TimeStamp, QTY_SCALE};
use crate::safe;

/// Order side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Order lifecycle status as reported by the venue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    New,
    PartiallyFilled,
    Filled,
    Canceled,
}

impl OrderStatus {
    /// True while the venue may still report fills for the order
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyFilled)
    }
}

/// Latest known state of a single market.
///
/// Hot fields (touched on every update) lead the struct; the symbol tags
/// along for snapshots and dumps. Created lazily on the first update for
/// a symbol, mutated only by the sequencer, never destroyed during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketState {
    #[serde(rename = "price")]
    pub price_micros: PriceMicros,
    #[serde(rename = "qty")]
    pub total_qty_sats: QtySats,
    #[serde(rename = "last_update")]
    pub last_update_ts: TimeStamp,
    pub symbol: String,
}

/// Per-asset balance with strict accounting invariants.
///
/// After every mutation: `amount_sats >= 0`, `reserved_sats >= 0`,
/// `reserved_sats <= amount_sats`. A violation means the books no longer
/// describe reality, so it panics into the sequencer's dump boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub symbol: String,
    #[serde(rename = "amount")]
    pub amount_sats: i64,
    #[serde(rename = "reserved")]
    pub reserved_sats: i64,
    pub last_seq: Seq,
}

impl Balance {
    /// Funds not locked behind open orders
    pub fn available_sats(&self) -> i64 {
        safe::sub(self.amount_sats, self.reserved_sats)
    }

    /// Add funds
    pub fn credit(&mut self, amount_sats: i64, seq: Seq) {
        self.amount_sats = safe::add(self.amount_sats, amount_sats);
        self.last_seq = seq;
    }

    /// Remove funds. Panics if the available balance cannot cover it.
    pub fn debit(&mut self, amount_sats: i64, seq: Seq) {
        if amount_sats > self.available_sats() {
            panic!(
                "balance debit exceeds available: {} needs {}, available {}",
                self.symbol,
                amount_sats,
                self.available_sats()
            );
        }
        self.amount_sats = safe::sub(self.amount_sats, amount_sats);
        self.last_seq = seq;
    }

    /// Lock funds for an open order
    pub fn reserve(&mut self, amount_sats: i64, seq: Seq) {
        if amount_sats > self.available_sats() {
            panic!(
                "balance reserve exceeds available: {} needs {}, available {}",
                self.symbol,
                amount_sats,
                self.available_sats()
            );
        }
        self.reserved_sats = safe::add(self.reserved_sats, amount_sats);
        self.last_seq = seq;
    }

    /// Unlock previously reserved funds
    pub fn release(&mut self, amount_sats: i64, seq: Seq) {
        if amount_sats > self.reserved_sats {
            panic!(
                "balance release exceeds reserved: {} releases {}, reserved {}",
                self.symbol, amount_sats, self.reserved_sats
            );
        }
        self.reserved_sats = safe::sub(self.reserved_sats, amount_sats);
        self.last_seq = seq;
    }

    /// Assert the accounting invariants. Panics on violation.
    pub fn verify_invariants(&self) {
        if self.amount_sats < 0 {
            panic!(
                "balance invariant violated: {} amount {} < 0",
                self.symbol, self.amount_sats
            );
        }
        if self.reserved_sats < 0 {
            panic!(
                "balance invariant violated: {} reserved {} < 0",
                self.symbol, self.reserved_sats
            );
        }
        if self.reserved_sats > self.amount_sats {
            panic!(
                "balance invariant violated: {} reserved {} > amount {}",
                self.symbol, self.reserved_sats, self.amount_sats
            );
        }
    }
}

/// All per-asset balances, created on first access
#[derive(Debug, Default)]
pub struct BalanceBook {
    balances: HashMap<String, Balance>,
}

impl BalanceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance for `symbol`, creating an empty one if absent
    pub fn get_mut(&mut self, symbol: &str) -> &mut Balance {
        self.balances
            .entry(symbol.to_string())
            .or_insert_with(|| Balance {
                symbol: symbol.to_string(),
                ..Balance::default()
            })
    }

    /// Read-only lookup without creation
    pub fn get(&self, symbol: &str) -> Option<&Balance> {
        self.balances.get(symbol)
    }

    /// Assert invariants across every balance
    pub fn verify_all(&self) {
        for balance in self.balances.values() {
            balance.verify_invariants();
        }
    }

    /// Copy of all balances in deterministic order, for dumps
    pub fn snapshot(&self) -> BTreeMap<String, Balance> {
        self.balances
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Total portfolio value in quote micros, given a symbol -> price map.
    ///
    /// Assets without a quoted price are skipped rather than valued at a
    /// guess. Reserved funds are part of the total.
    pub fn total_equity(&self, prices: &HashMap<String, PriceMicros>) -> i64 {
        let mut total: i64 = 0;
        for (symbol, balance) in &self.balances {
            let Some(price) = prices.get(symbol) else {
                continue;
            };
            let value = safe::mul_div(balance.amount_sats, *price, QTY_SCALE);
            total = safe::add(total, value);
        }
        total
    }
}

/// Sequencer-side record of an order the venue still owes fills for.
///
/// `reserved_sats` tracks the slice of the reservation not yet consumed:
/// quote sats for buys, base sats for sells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub price_micros: PriceMicros,
    pub qty_sats: QtySats,
    pub filled_qty_sats: QtySats,
    pub reserved_sats: i64,
}

/// Split a `BASE-QUOTE` market symbol into its two assets.
///
/// Returns `None` when either side is empty or the separator is missing;
/// callers treat that as a benign, logged skip.
pub fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    symbol
        .split_once('-')
        .filter(|(base, quote)| !base.is_empty() && !quote.is_empty())
}
