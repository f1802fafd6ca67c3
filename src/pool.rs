//! Event reuse pool
//!
//! Producers fire thousands of events per second; allocating a fresh
//! `String`-carrying struct for each would put allocation on the hot
//! path. The pool keeps consumed events as free lists: gateways acquire,
//! the sequencer releases after processing, and the `String` capacity
//! travels with the value.
//!
//! Acquire never fails (the pool grows on demand). Release zeroes every
//! field, so an acquired event always starts from its zero value.

use parking_lot::Mutex;

use crate::event::{Event, MarketUpdate, OrderUpdate};

/// Default number of events pre-allocated per variant by [`EventPool::warm_up`]
pub const DEFAULT_WARMUP: usize = 1000;

/// Thread-safe free lists for hot-path event values
#[derive(Debug, Default)]
pub struct EventPool {
    market_updates: Mutex<Vec<MarketUpdate>>,
    order_updates: Mutex<Vec<OrderUpdate>>,
}

impl EventPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate `batch` events of each variant so the first ticks
    /// after startup do not pay for allocation.
    pub fn warm_up(&self, batch: usize) {
        let mut markets = self.market_updates.lock();
        markets.reserve(batch);
        for _ in 0..batch {
            markets.push(MarketUpdate::default());
        }
        drop(markets);

        let mut orders = self.order_updates.lock();
        orders.reserve(batch);
        for _ in 0..batch {
            orders.push(OrderUpdate::default());
        }
    }

    /// Take a zeroed market update from the pool, growing it if empty
    pub fn acquire_market_update(&self) -> MarketUpdate {
        self.market_updates.lock().pop().unwrap_or_default()
    }

    /// Return a market update, zeroing all fields first
    pub fn release_market_update(&self, mut ev: MarketUpdate) {
        ev.seq = 0;
        ev.ts = 0;
        ev.symbol.clear();
        ev.price_micros = 0;
        ev.qty_sats = 0;
        ev.exchange.clear();
        self.market_updates.lock().push(ev);
    }

    /// Take a zeroed order update from the pool, growing it if empty
    pub fn acquire_order_update(&self) -> OrderUpdate {
        self.order_updates.lock().pop().unwrap_or_default()
    }

    /// Return an order update, zeroing all fields first
    pub fn release_order_update(&self, mut ev: OrderUpdate) {
        ev.seq = 0;
        ev.ts = 0;
        ev.order_id.clear();
        ev.symbol.clear();
        ev.side = Default::default();
        ev.status = Default::default();
        ev.price_micros = 0;
        ev.qty_sats = 0;
        ev.accumulated_qty_sats = 0;
        self.order_updates.lock().push(ev);
    }

    /// Route a consumed event back to the matching free list.
    ///
    /// Unknown events own nothing worth pooling and are simply dropped.
    pub fn release_event(&self, ev: Event) {
        match ev {
            Event::MarketUpdate(ev) => self.release_market_update(ev),
            Event::OrderUpdate(ev) => self.release_order_update(ev),
            Event::Unknown { .. } => {}
        }
    }

    /// Number of idle market updates (diagnostics and tests)
    pub fn idle_market_updates(&self) -> usize {
        self.market_updates.lock().len()
    }

    /// Number of idle order updates (diagnostics and tests)
    pub fn idle_order_updates(&self) -> usize {
        self.order_updates.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderStatus, Side};

    #[test]
    fn release_zeroes_every_field() {
        let pool = EventPool::new();

        let mut ev = pool.acquire_market_update();
        ev.seq = 12;
        ev.ts = 34;
        ev.symbol.push_str("BTC-KRW");
        ev.price_micros = 100;
        ev.qty_sats = 200;
        ev.exchange.push_str("UPBIT");
        pool.release_market_update(ev);

        let reused = pool.acquire_market_update();
        assert_eq!(reused, MarketUpdate::default());
        // The symbol's capacity survives the round trip.
        assert!(reused.symbol.capacity() >= "BTC-KRW".len());
    }

    #[test]
    fn release_zeroes_order_updates() {
        let pool = EventPool::new();

        let mut ev = pool.acquire_order_update();
        ev.seq = 5;
        ev.order_id.push_str("ord-9");
        ev.side = Side::Sell;
        ev.status = OrderStatus::Filled;
        ev.accumulated_qty_sats = 77;
        pool.release_order_update(ev);

        assert_eq!(pool.acquire_order_update(), OrderUpdate::default());
    }

    #[test]
    fn warm_up_preallocates_both_variants() {
        let pool = EventPool::new();
        pool.warm_up(64);
        assert_eq!(pool.idle_market_updates(), 64);
        assert_eq!(pool.idle_order_updates(), 64);
    }

    #[test]
    fn acquire_never_fails_on_empty_pool() {
        let pool = EventPool::new();
        assert_eq!(pool.idle_market_updates(), 0);
        let ev = pool.acquire_market_update();
        assert_eq!(ev, MarketUpdate::default());
    }

    #[test]
    fn concurrent_producers_share_the_pool() {
        use std::sync::Arc;

        let pool = Arc::new(EventPool::new());
        pool.warm_up(32);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let mut ev = pool.acquire_market_update();
                        ev.seq = 1;
                        pool.release_market_update(ev);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.idle_market_updates(), 32);
    }
}
