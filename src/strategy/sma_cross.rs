//! SMA crossover reference strategy
//!
//! Stateful, deterministic, and allocation-free after construction: the
//! price history lives in a fixed-capacity ring buffer sized to the long
//! period, with a running sum so each update is O(short_period).

use crate::domain::MarketState;
use crate::error::{EngineError, Result};
use crate::quant::QtySats;
use crate::safe;

use super::{Action, ActionKind, Strategy};

/// Order size emitted on a cross
const ORDER_QTY_SATS: QtySats = 10_000;

/// Simple-moving-average crossover over fixed-point prices.
///
/// A golden cross (short SMA moving strictly above the long SMA after
/// being at or below it) buys; a dead cross sells. Equality on the
/// previous tick alone never fires a cross.
pub struct SmaCrossStrategy {
    symbol: String,
    short_period: usize,
    long_period: usize,

    // Ring buffer over the last `long_period` prices. `head` is the next
    // write slot, which is also the oldest sample once the buffer is full.
    prices: Vec<i64>,
    head: usize,
    count: usize,
    sum: i64,

    prev_short_sma: i64,
    prev_long_sma: i64,
}

impl SmaCrossStrategy {
    /// Create a strategy for one symbol. Requires `1 <= short < long`.
    pub fn new(symbol: impl Into<String>, short_period: usize, long_period: usize) -> Result<Self> {
        if short_period == 0 || short_period >= long_period {
            return Err(EngineError::Config(format!(
                "sma crossover requires 1 <= short < long, got short={short_period} long={long_period}"
            )));
        }
        Ok(Self {
            symbol: symbol.into(),
            short_period,
            long_period,
            prices: vec![0; long_period],
            head: 0,
            count: 0,
            sum: 0,
            prev_short_sma: 0,
            prev_long_sma: 0,
        })
    }

    /// Sum of the most recent `short_period` samples, walking backward
    /// from the write head.
    fn short_sma(&self) -> i64 {
        let mut sum: i64 = 0;
        let mut idx = self.head;
        for _ in 0..self.short_period {
            idx = idx.checked_sub(1).unwrap_or(self.long_period - 1);
            sum = safe::add(sum, self.prices[idx]);
        }
        safe::div(sum, self.short_period as i64)
    }

    #[cfg(test)]
    fn window_sum(&self) -> i64 {
        self.sum
    }
}

impl Strategy for SmaCrossStrategy {
    fn on_market_update(&mut self, state: &MarketState) -> Vec<Action> {
        if state.symbol != self.symbol {
            return Vec::new();
        }

        let price = state.price_micros;

        // Evict the sample about to be overwritten before it leaves the
        // window, so `sum` always covers exactly the buffered prices.
        if self.count == self.long_period {
            self.sum = safe::sub(self.sum, self.prices[self.head]);
        }
        self.prices[self.head] = price;
        self.sum = safe::add(self.sum, price);
        self.head = (self.head + 1) % self.long_period;
        if self.count < self.long_period {
            self.count += 1;
        }

        if self.count < self.long_period {
            return Vec::new();
        }

        let long_sma = safe::div(self.sum, self.long_period as i64);
        let short_sma = self.short_sma();

        let mut actions = Vec::new();
        if self.prev_short_sma != 0 && self.prev_long_sma != 0 {
            if self.prev_short_sma <= self.prev_long_sma && short_sma > long_sma {
                actions.push(Action {
                    kind: ActionKind::Buy,
                    symbol: self.symbol.clone(),
                    price_micros: price,
                    qty_sats: ORDER_QTY_SATS,
                });
            }
            if self.prev_short_sma >= self.prev_long_sma && short_sma < long_sma {
                actions.push(Action {
                    kind: ActionKind::Sell,
                    symbol: self.symbol.clone(),
                    price_micros: price,
                    qty_sats: ORDER_QTY_SATS,
                });
            }
        }

        self.prev_short_sma = short_sma;
        self.prev_long_sma = long_sma;

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(strategy: &mut SmaCrossStrategy, price: i64) -> Vec<Action> {
        let state = MarketState {
            price_micros: price,
            total_qty_sats: 0,
            last_update_ts: 0,
            symbol: "BTC".to_string(),
        };
        strategy.on_market_update(&state)
    }

    #[test]
    fn construction_rejects_bad_periods() {
        assert!(SmaCrossStrategy::new("BTC", 5, 5).is_err());
        assert!(SmaCrossStrategy::new("BTC", 6, 5).is_err());
        assert!(SmaCrossStrategy::new("BTC", 0, 5).is_err());
        assert!(SmaCrossStrategy::new("BTC", 1, 2).is_ok());
    }

    #[test]
    fn silent_until_long_window_fills() {
        let mut strategy = SmaCrossStrategy::new("BTC", 3, 5).unwrap();
        for i in 0..4 {
            assert!(push(&mut strategy, 100 + i).is_empty());
        }
    }

    #[test]
    fn golden_then_dead_cross() {
        let mut strategy = SmaCrossStrategy::new("BTC", 3, 5).unwrap();

        // Five flat ticks fill the window; previous SMAs are still zero,
        // so even the fill tick stays silent.
        for _ in 0..5 {
            assert!(push(&mut strategy, 100).is_empty());
        }

        // 200 lifts short=(100+100+200)/3=133 above long=600/5=120 from a
        // flat (100, 100) previous pair: golden cross.
        let actions = push(&mut strategy, 200);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Buy);
        assert_eq!(actions[0].price_micros, 200);
        assert_eq!(actions[0].qty_sats, ORDER_QTY_SATS);

        // 50: short=(100+200+50)/3=116 still above long=550/5=110.
        assert!(push(&mut strategy, 50).is_empty());

        // 0: short=(200+50+0)/3=83 drops below long=450/5=90: dead cross.
        let actions = push(&mut strategy, 0);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Sell);
        assert_eq!(actions[0].price_micros, 0);
    }

    #[test]
    fn equality_on_previous_tick_does_not_fire() {
        let mut strategy = SmaCrossStrategy::new("BTC", 1, 2).unwrap();
        // Window [100, 100]: short == long == 100, prevs become equal.
        push(&mut strategy, 100);
        push(&mut strategy, 100);
        // Rising tick: prev short == prev long (non-strict holds both
        // ways), current short > long -> exactly one buy, no sell.
        let actions = push(&mut strategy, 200);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Buy);
    }

    #[test]
    fn running_sum_tracks_the_window_across_wraps() {
        let mut strategy = SmaCrossStrategy::new("BTC", 2, 4).unwrap();
        let feed = [10, 20, 30, 40, 50, 60, 70];
        for (i, price) in feed.iter().enumerate() {
            push(&mut strategy, *price);
            let window: i64 = feed[i.saturating_sub(3)..=i].iter().sum();
            assert_eq!(strategy.window_sum(), window);
        }
    }

    #[test]
    fn other_symbols_are_ignored() {
        let mut strategy = SmaCrossStrategy::new("BTC", 3, 5).unwrap();
        let state = MarketState {
            price_micros: 100,
            total_qty_sats: 0,
            last_update_ts: 0,
            symbol: "ETH".to_string(),
        };
        for _ in 0..10 {
            assert!(strategy.on_market_update(&state).is_empty());
        }
        assert_eq!(strategy.window_sum(), 0);
    }

    #[test]
    fn integer_division_truncates_toward_zero() {
        let mut strategy = SmaCrossStrategy::new("BTC", 3, 5).unwrap();
        for price in [100, 100, 100, 200, 50] {
            push(&mut strategy, price);
        }
        // (100+100+100+200+50)/5 = 110 exactly.
        assert_eq!(strategy.prev_long_sma, 110);
        // (100+200+50)/3 = 116 with the remainder dropped.
        assert_eq!(strategy.prev_short_sma, 116);
    }
}
