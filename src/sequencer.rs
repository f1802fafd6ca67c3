//! Single-writer event sequencer
//!
//! The hot path of the engine. Exactly one task drains the inbox and owns
//! every piece of mutable state: the market map, the balance book, the
//! open-order registry and the sequence counter. Events are validated
//! against the expected sequence number, persisted to the write-ahead
//! log, applied to state, handed to the strategy, and only then announced
//! to observers.
//!
//! Corruption-class failures (sequence gap beyond tolerance, persistence
//! failure, balance invariant violation, arithmetic overflow) do not
//! propagate as errors: the loop writes a post-mortem state dump and
//! terminates the process, leaving the WAL as the recovery source.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::domain::{split_symbol, BalanceBook, MarketState, OpenOrder, OrderStatus, Side};
use crate::event::{Event, MarketUpdate, OrderUpdate};
use crate::pool::EventPool;
use crate::quant::{Seq, PRICE_SCALE};
use crate::safe;
use crate::store::EventStore;
use crate::strategy::{Action, Strategy};

/// Exit code used when the hot path hits a corruption-class failure
const FATAL_EXIT_CODE: i32 = 70;

type MarketMap = Arc<RwLock<HashMap<String, MarketState>>>;

/// Cloneable read-only view of the market map.
///
/// `get` holds the shared lock only long enough to copy one value out;
/// nothing can retain a reference into the sequencer's state.
#[derive(Clone)]
pub struct MarketReader {
    markets: MarketMap,
}

impl MarketReader {
    /// Snapshot of one market, or `None` before its first update
    pub fn get(&self, symbol: &str) -> Option<MarketState> {
        self.markets.read().get(symbol).cloned()
    }

    /// Copy of every market, keyed in deterministic order
    pub fn snapshot(&self) -> BTreeMap<String, MarketState> {
        self.markets
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[derive(Serialize)]
struct StateDump {
    next_seq: Seq,
    markets: BTreeMap<String, MarketState>,
    balances: BTreeMap<String, crate::domain::Balance>,
}

enum SeqCheck {
    Apply,
    DropDuplicate,
}

/// The single-writer event processor
pub struct Sequencer {
    inbox_tx: mpsc::Sender<Event>,
    inbox_rx: mpsc::Receiver<Event>,

    markets: MarketMap,
    balances: BalanceBook,
    open_orders: HashMap<String, OpenOrder>,
    next_seq: Seq,

    gap_tolerance: u64,
    dump_path: PathBuf,

    store: Option<EventStore>,
    strategy: Option<Box<dyn Strategy>>,
    action_tx: Option<mpsc::Sender<Action>>,
    observer_tx: Option<mpsc::Sender<MarketState>>,
    pool: Option<Arc<EventPool>>,
}

impl Sequencer {
    /// Build a sequencer. `store` is the write-ahead log (absent only for
    /// replay-driven instances); `strategy` is invoked on every applied
    /// market update.
    pub fn new(
        config: &Config,
        store: Option<EventStore>,
        strategy: Option<Box<dyn Strategy>>,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(config.inbox_capacity);
        Self {
            inbox_tx,
            inbox_rx,
            markets: Arc::new(RwLock::new(HashMap::new())),
            balances: BalanceBook::new(),
            open_orders: HashMap::new(),
            next_seq: 1,
            gap_tolerance: config.gap_tolerance,
            dump_path: PathBuf::from(&config.dump_path),
            store,
            strategy,
            action_tx: None,
            observer_tx: None,
            pool: None,
        }
    }

    /// Forward strategy actions to `tx` (non-blocking; overflow is logged)
    pub fn with_action_sink(mut self, tx: mpsc::Sender<Action>) -> Self {
        self.action_tx = Some(tx);
        self
    }

    /// Send a copy of each updated market state to `tx`, strictly after
    /// the WAL append and state mutation for that event.
    pub fn with_observer(mut self, tx: mpsc::Sender<MarketState>) -> Self {
        self.observer_tx = Some(tx);
        self
    }

    /// Release consumed events back into `pool`
    pub fn with_pool(mut self, pool: Arc<EventPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Bounded submission endpoint for producers. Senders must use
    /// `try_send` and account for their own drops.
    pub fn inbox(&self) -> mpsc::Sender<Event> {
        self.inbox_tx.clone()
    }

    /// Read-only handle usable from any task
    pub fn market_reader(&self) -> MarketReader {
        MarketReader {
            markets: self.markets.clone(),
        }
    }

    /// Snapshot of one market, or `None` for an unknown symbol
    pub fn get_market_state(&self, symbol: &str) -> Option<MarketState> {
        self.markets.read().get(symbol).cloned()
    }

    /// Copy of the balance book in deterministic order
    pub fn balance_snapshot(&self) -> BTreeMap<String, crate::domain::Balance> {
        self.balances.snapshot()
    }

    /// Credit bootstrap funds before the run starts. Stamped with seq 0
    /// so the first real event still dominates `last_seq`.
    pub fn seed_balance(&mut self, symbol: &str, amount_sats: i64) {
        self.balances.get_mut(symbol).credit(amount_sats, 0);
        self.balances.verify_all();
    }

    pub(crate) fn next_seq(&self) -> Seq {
        self.next_seq
    }

    /// Jump the expected sequence forward without applying anything.
    /// Used by the replayer to honor gaps the live run already tolerated.
    pub(crate) fn fast_forward_to(&mut self, seq: Seq) {
        warn!(
            expected = self.next_seq,
            got = seq,
            "fast-forwarding over persisted sequence gap"
        );
        self.next_seq = seq;
    }

    /// Run the hot path until shutdown. Must be the only caller mutating
    /// this sequencer for the lifetime of the loop.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            next_seq = self.next_seq,
            gap_tolerance = self.gap_tolerance,
            "sequencer started (single-writer hot path)"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("sequencer stopping, inbox abandoned");
                    break;
                }
                maybe_ev = self.inbox_rx.recv() => match maybe_ev {
                    Some(ev) => self.process_guarded(ev),
                    None => {
                        info!("inbox closed, sequencer stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Process one event behind the fatal boundary: any panic below is a
    /// corruption-class failure, answered with a dump and termination.
    fn process_guarded(&mut self, ev: Event) {
        let seq = ev.seq();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| self.process_event(ev)));
        if let Err(panic) = outcome {
            error!(
                seq,
                reason = %panic_message(panic.as_ref()),
                "fatal condition on hot path, dumping state"
            );
            let dump_path = self.dump_path.clone();
            if let Err(err) = self.dump_state(&dump_path) {
                error!(error = %err, "state dump failed");
            }
            std::process::exit(FATAL_EXIT_CODE);
        }
    }

    /// Validate, persist, apply, advance. Panics on fatal conditions.
    fn process_event(&mut self, ev: Event) {
        match self.validate_sequence(ev.seq()) {
            SeqCheck::DropDuplicate => {
                self.release(ev);
                return;
            }
            SeqCheck::Apply => {}
        }

        // WAL-first: nothing mutates until the event is durable.
        if let Some(store) = &self.store {
            if let Err(err) = store.append(&ev) {
                panic!("write-ahead append failed at seq {}: {err}", ev.seq());
            }
        }

        self.dispatch(&ev);
        self.next_seq += 1;
        self.release(ev);
    }

    fn validate_sequence(&mut self, ev_seq: Seq) -> SeqCheck {
        if ev_seq == self.next_seq {
            return SeqCheck::Apply;
        }
        if ev_seq < self.next_seq {
            warn!(
                expected = self.next_seq,
                got = ev_seq,
                "duplicate or stale event ignored"
            );
            return SeqCheck::DropDuplicate;
        }
        let gap = ev_seq - self.next_seq;
        if gap <= self.gap_tolerance {
            warn!(
                expected = self.next_seq,
                got = ev_seq,
                gap,
                "sequence gap within tolerance, fast-forwarding"
            );
            self.next_seq = ev_seq;
            return SeqCheck::Apply;
        }
        panic!(
            "sequence gap exceeds tolerance: expected {}, got {} (gap {gap} > {})",
            self.next_seq, ev_seq, self.gap_tolerance
        );
    }

    fn dispatch(&mut self, ev: &Event) {
        match ev {
            Event::MarketUpdate(update) => self.handle_market_update(update),
            Event::OrderUpdate(update) => self.handle_order_update(update),
            Event::Unknown { seq, type_tag, .. } => {
                warn!(seq, type_tag = %type_tag, "unknown event type skipped");
            }
        }
    }

    fn handle_market_update(&mut self, ev: &MarketUpdate) {
        let snapshot = {
            let mut markets = self.markets.write();
            let state = markets
                .entry(ev.symbol.clone())
                .or_insert_with(|| MarketState {
                    symbol: ev.symbol.clone(),
                    ..MarketState::default()
                });
            state.price_micros = ev.price_micros;
            state.total_qty_sats = ev.qty_sats;
            state.last_update_ts = ev.ts;
            state.clone()
        };

        if let Some(strategy) = self.strategy.as_mut() {
            for action in strategy.on_market_update(&snapshot) {
                info!(
                    kind = %action.kind,
                    symbol = %action.symbol,
                    price = action.price_micros,
                    qty = action.qty_sats,
                    "strategy action"
                );
                if let Some(tx) = &self.action_tx {
                    if tx.try_send(action).is_err() {
                        warn!("action sink unavailable, action dropped");
                    }
                }
            }
        }

        if let Some(tx) = &self.observer_tx {
            // Advisory: a slow observer loses updates, never stalls us.
            let _ = tx.try_send(snapshot);
        }
    }

    fn handle_order_update(&mut self, ev: &OrderUpdate) {
        match ev.status {
            OrderStatus::New => self.register_order(ev),
            OrderStatus::PartiallyFilled | OrderStatus::Filled => self.apply_fill(ev),
            OrderStatus::Canceled => self.cancel_order(ev),
        }
        self.balances.verify_all();
    }

    fn register_order(&mut self, ev: &OrderUpdate) {
        if self.open_orders.contains_key(&ev.order_id) {
            warn!(order_id = %ev.order_id, "duplicate order registration ignored");
            return;
        }
        let Some((base, quote)) = split_symbol(&ev.symbol) else {
            warn!(order_id = %ev.order_id, symbol = %ev.symbol, "unparseable market symbol, order skipped");
            return;
        };

        // Market orders (price 0) carry no reservation; they settle
        // directly out of the available balance on fill.
        let mut reserved = 0;
        if ev.price_micros > 0 {
            match ev.side {
                Side::Buy => {
                    let cost = safe::mul_div(ev.price_micros, ev.qty_sats, PRICE_SCALE);
                    self.balances.get_mut(quote).reserve(cost, ev.seq);
                    reserved = cost;
                }
                Side::Sell => {
                    self.balances.get_mut(base).reserve(ev.qty_sats, ev.seq);
                    reserved = ev.qty_sats;
                }
            }
        }

        self.open_orders.insert(
            ev.order_id.clone(),
            OpenOrder {
                order_id: ev.order_id.clone(),
                symbol: ev.symbol.clone(),
                side: ev.side,
                price_micros: ev.price_micros,
                qty_sats: ev.qty_sats,
                filled_qty_sats: ev.accumulated_qty_sats,
                reserved_sats: reserved,
            },
        );
    }

    fn apply_fill(&mut self, ev: &OrderUpdate) {
        let Some(order) = self.open_orders.get_mut(&ev.order_id) else {
            warn!(order_id = %ev.order_id, "fill for unknown order skipped");
            return;
        };
        let Some((base, quote)) = split_symbol(&order.symbol) else {
            warn!(order_id = %ev.order_id, symbol = %order.symbol, "unparseable market symbol, fill skipped");
            return;
        };

        let fill_delta = safe::sub(ev.accumulated_qty_sats, order.filled_qty_sats);
        if fill_delta > 0 {
            let fill_price = if ev.price_micros > 0 {
                ev.price_micros
            } else {
                order.price_micros
            };
            let cost = safe::mul_div(fill_price, fill_delta, PRICE_SCALE);

            match order.side {
                Side::Buy => {
                    let released = cost.min(order.reserved_sats);
                    if released > 0 {
                        self.balances.get_mut(quote).release(released, ev.seq);
                        order.reserved_sats = safe::sub(order.reserved_sats, released);
                    }
                    self.balances.get_mut(quote).debit(cost, ev.seq);
                    self.balances.get_mut(base).credit(fill_delta, ev.seq);
                }
                Side::Sell => {
                    let released = fill_delta.min(order.reserved_sats);
                    if released > 0 {
                        self.balances.get_mut(base).release(released, ev.seq);
                        order.reserved_sats = safe::sub(order.reserved_sats, released);
                    }
                    self.balances.get_mut(base).debit(fill_delta, ev.seq);
                    self.balances.get_mut(quote).credit(cost, ev.seq);
                }
            }
            order.filled_qty_sats = ev.accumulated_qty_sats;
        }

        if ev.status == OrderStatus::Filled {
            let leftover = order.reserved_sats;
            let reserve_asset = match order.side {
                Side::Buy => quote.to_string(),
                Side::Sell => base.to_string(),
            };
            self.open_orders.remove(&ev.order_id);
            if leftover > 0 {
                self.balances
                    .get_mut(&reserve_asset)
                    .release(leftover, ev.seq);
            }
        }
    }

    fn cancel_order(&mut self, ev: &OrderUpdate) {
        let Some(order) = self.open_orders.remove(&ev.order_id) else {
            warn!(order_id = %ev.order_id, "cancel for unknown order skipped");
            return;
        };
        if order.reserved_sats > 0 {
            if let Some((base, quote)) = split_symbol(&order.symbol) {
                let asset = match order.side {
                    Side::Buy => quote,
                    Side::Sell => base,
                };
                self.balances
                    .get_mut(asset)
                    .release(order.reserved_sats, ev.seq);
            }
        }
    }

    /// Apply one event without a WAL append. Replay-only: the sequence
    /// must match exactly; the replayer resolves persisted gaps itself.
    pub fn replay_event(&mut self, ev: Event) {
        if ev.seq() != self.next_seq {
            panic!(
                "replay sequence mismatch: expected {}, got {}",
                self.next_seq,
                ev.seq()
            );
        }
        self.dispatch(&ev);
        self.next_seq += 1;
        self.release(ev);
    }

    /// Serialize the full mutable state for post-mortem inspection
    pub fn dump_state(&self, path: &Path) -> crate::error::Result<()> {
        info!(path = %path.display(), "writing state dump");
        let dump = StateDump {
            next_seq: self.next_seq,
            markets: self
                .markets
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            balances: self.balances.snapshot(),
        };
        let json = serde_json::to_string_pretty(&dump)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn release(&self, ev: Event) {
        if let Some(pool) = &self.pool {
            pool.release_event(ev);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
