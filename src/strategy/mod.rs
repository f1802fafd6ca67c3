//! Trading strategy contract
//!
//! Strategies run synchronously inside the sequencer's hot path: they
//! receive the freshly-applied market state and answer with an ordered
//! list of actions. They own whatever internal state they need, must be
//! deterministic, and must not block.

mod sma_cross;

pub use sma_cross::SmaCrossStrategy;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::MarketState;
use crate::quant::{PriceMicros, QtySats};

/// What a strategy wants done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Buy,
    Sell,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Buy => write!(f, "buy"),
            ActionKind::Sell => write!(f, "sell"),
        }
    }
}

/// A single decision emitted by a strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub symbol: String,
    pub price_micros: PriceMicros,
    pub qty_sats: QtySats,
}

/// Synchronous strategy invoked by the sequencer after every applied
/// market update.
pub trait Strategy: Send {
    /// React to a market update. The returned actions are forwarded to
    /// the action sink in order; an empty vector means "no opinion".
    fn on_market_update(&mut self, state: &MarketState) -> Vec<Action>;
}
