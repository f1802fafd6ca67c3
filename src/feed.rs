//! Synthetic market data producer
//!
//! Stands where an exchange gateway would: it acquires events from the
//! pool, stamps them from the shared sequence allocator, submits them
//! with a non-blocking send, and accounts for its own drops. The price
//! path is a deterministic zig-zag, which is enough to drive the moving
//! averages through crosses during a demo run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::event::{Event, SeqAllocator};
use crate::pool::EventPool;
use crate::quant::{PRICE_SCALE, QTY_SCALE};

/// Half-period of the synthetic price wave, in ticks
const WAVE_TICKS: i64 = 20;

/// Per-tick price step as a fraction of the base price (1/200 = 0.5%)
const STEP_DIVISOR: i64 = 200;

/// Publish synthetic ticks for `symbols` until shutdown.
pub async fn run_synthetic(
    pool: Arc<EventPool>,
    seqs: SeqAllocator,
    inbox: mpsc::Sender<Event>,
    symbols: Vec<String>,
    interval_ms: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(symbols = symbols.len(), interval_ms, "synthetic feed started");

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    let mut step: i64 = 0;
    let mut dropped: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        for (index, symbol) in symbols.iter().enumerate() {
            // Deterministic triangle wave around a per-symbol base price.
            let base = (index as i64 + 1) * 50_000 * PRICE_SCALE;
            let phase = step % (2 * WAVE_TICKS);
            let offset = if phase < WAVE_TICKS {
                phase
            } else {
                2 * WAVE_TICKS - phase
            };
            let price = base + offset * (base / STEP_DIVISOR);

            let mut ev = pool.acquire_market_update();
            ev.seq = seqs.next();
            ev.ts = chrono::Utc::now().timestamp_micros();
            ev.symbol.push_str(symbol);
            ev.price_micros = price;
            ev.qty_sats = QTY_SCALE;
            ev.exchange.push_str("UPBIT");

            if let Err(err) = inbox.try_send(Event::MarketUpdate(ev)) {
                // The sequence number is burned; the sequencer will see a
                // gap and fast-forward within tolerance.
                dropped += 1;
                pool.release_event(err.into_inner());
            }
        }
        step += 1;
    }

    if dropped > 0 {
        warn!(dropped, "synthetic feed dropped events on full inbox");
    }
    info!("synthetic feed stopped");
}
