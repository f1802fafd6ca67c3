//! Domain events
//!
//! A closed sum type: every event carries a monotonic sequence number and
//! a timestamp, and adding a variant forces every dispatch site to
//! acknowledge it. Payloads persist as versioned JSON so a replayer can
//! reject encodings it does not understand instead of misreading them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{OrderStatus, Side};
use crate::error::{EngineError, Result};
use crate::quant::{PriceMicros, QtySats, Seq, TimeStamp};

/// Payload encoding version written to and accepted from the store
pub const PAYLOAD_VERSION: u32 = 1;

/// Type tag persisted for market updates
pub const TAG_MARKET_UPDATE: &str = "market_update";

/// Type tag persisted for order updates
pub const TAG_ORDER_UPDATE: &str = "order_update";

/// Price/volume tick from one venue.
///
/// `exchange` is an opaque venue tag (`"UPBIT"`, `"BITGET_S"`,
/// `"BITGET_F"`, `"FX"`); the engine stores it verbatim and never
/// branches on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketUpdate {
    pub seq: Seq,
    pub ts: TimeStamp,
    pub symbol: String,
    pub price_micros: PriceMicros,
    pub qty_sats: QtySats,
    pub exchange: String,
}

/// Order lifecycle report from a venue.
///
/// `accumulated_qty_sats` is the venue's running fill total for the
/// order; the sequencer turns consecutive reports into fill deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub seq: Seq,
    pub ts: TimeStamp,
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub status: OrderStatus,
    pub price_micros: PriceMicros,
    pub qty_sats: QtySats,
    pub accumulated_qty_sats: QtySats,
}

/// Every event the sequencer can receive
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    MarketUpdate(MarketUpdate),
    OrderUpdate(OrderUpdate),
    /// Persisted row whose type tag this build does not recognize.
    /// Logged and skipped, but still consumes its sequence number.
    Unknown {
        seq: Seq,
        ts: TimeStamp,
        type_tag: String,
    },
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    v: u32,
    #[serde(flatten)]
    body: &'a T,
}

#[derive(Deserialize)]
struct VersionProbe {
    v: u32,
}

impl Event {
    /// Sequence number from the common header
    pub fn seq(&self) -> Seq {
        match self {
            Event::MarketUpdate(ev) => ev.seq,
            Event::OrderUpdate(ev) => ev.seq,
            Event::Unknown { seq, .. } => *seq,
        }
    }

    /// Timestamp from the common header
    pub fn ts(&self) -> TimeStamp {
        match self {
            Event::MarketUpdate(ev) => ev.ts,
            Event::OrderUpdate(ev) => ev.ts,
            Event::Unknown { ts, .. } => *ts,
        }
    }

    /// Stable tag persisted alongside the payload
    pub fn type_tag(&self) -> &str {
        match self {
            Event::MarketUpdate(_) => TAG_MARKET_UPDATE,
            Event::OrderUpdate(_) => TAG_ORDER_UPDATE,
            Event::Unknown { type_tag, .. } => type_tag,
        }
    }

    /// Serialize the payload column for the event store
    pub fn encode_payload(&self) -> Result<String> {
        let json = match self {
            Event::MarketUpdate(ev) => serde_json::to_string(&Envelope {
                v: PAYLOAD_VERSION,
                body: ev,
            })?,
            Event::OrderUpdate(ev) => serde_json::to_string(&Envelope {
                v: PAYLOAD_VERSION,
                body: ev,
            })?,
            // An unknown event re-persists as its bare envelope; the tag
            // column keeps whatever the producer wrote.
            Event::Unknown { .. } => format!("{{\"v\":{PAYLOAD_VERSION}}}"),
        };
        Ok(json)
    }

    /// Rebuild an event from a persisted row.
    ///
    /// An unsupported payload version is a hard error. An unrecognized
    /// type tag decodes to [`Event::Unknown`] so replay can skip it the
    /// same way the live path did.
    pub fn decode(seq: Seq, ts: TimeStamp, type_tag: &str, payload: &str) -> Result<Event> {
        let probe: VersionProbe = serde_json::from_str(payload)?;
        if probe.v != PAYLOAD_VERSION {
            return Err(EngineError::UnsupportedVersion(probe.v));
        }
        match type_tag {
            TAG_MARKET_UPDATE => Ok(Event::MarketUpdate(serde_json::from_str(payload)?)),
            TAG_ORDER_UPDATE => Ok(Event::OrderUpdate(serde_json::from_str(payload)?)),
            _ => Ok(Event::Unknown {
                seq,
                ts,
                type_tag: type_tag.to_string(),
            }),
        }
    }
}

/// Shared monotonic sequence source.
///
/// Every producer holds a clone and stamps each event before enqueueing,
/// so sequence numbers stay monotonic across gateways and reconnects.
#[derive(Debug, Clone, Default)]
pub struct SeqAllocator {
    counter: Arc<AtomicU64>,
}

impl SeqAllocator {
    /// Allocator whose first `next()` returns 1
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator resuming after an already-persisted sequence number
    pub fn starting_after(last: Seq) -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(last)),
        }
    }

    /// Claim the next sequence number
    pub fn next(&self) -> Seq {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Most recently claimed sequence number (0 if none)
    pub fn last(&self) -> Seq {
        self.counter.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_market_update() -> MarketUpdate {
        MarketUpdate {
            seq: 7,
            ts: 1_700_000_000_000_000,
            symbol: "BTC-KRW".to_string(),
            price_micros: 100_000_000_000_000,
            qty_sats: 100_000_000,
            exchange: "UPBIT".to_string(),
        }
    }

    #[test]
    fn header_accessors_cover_every_variant() {
        let ev = Event::MarketUpdate(sample_market_update());
        assert_eq!(ev.seq(), 7);
        assert_eq!(ev.ts(), 1_700_000_000_000_000);
        assert_eq!(ev.type_tag(), TAG_MARKET_UPDATE);

        let unknown = Event::Unknown {
            seq: 9,
            ts: 42,
            type_tag: "funding_update".to_string(),
        };
        assert_eq!(unknown.seq(), 9);
        assert_eq!(unknown.type_tag(), "funding_update");
    }

    #[test]
    fn payload_round_trips() {
        let original = Event::MarketUpdate(sample_market_update());
        let payload = original.encode_payload().unwrap();
        let decoded = Event::decode(7, 1_700_000_000_000_000, TAG_MARKET_UPDATE, &payload).unwrap();
        assert_eq!(decoded, original);

        let order = Event::OrderUpdate(OrderUpdate {
            seq: 8,
            ts: 50,
            order_id: "ord-1".to_string(),
            symbol: "BTC-KRW".to_string(),
            side: Side::Sell,
            status: OrderStatus::PartiallyFilled,
            price_micros: 1_000_000,
            qty_sats: 20_000,
            accumulated_qty_sats: 5_000,
        });
        let payload = order.encode_payload().unwrap();
        assert_eq!(Event::decode(8, 50, TAG_ORDER_UPDATE, &payload).unwrap(), order);
    }

    #[test]
    fn decode_rejects_future_versions() {
        let err = Event::decode(1, 0, TAG_MARKET_UPDATE, "{\"v\":99}").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedVersion(99)));
    }

    #[test]
    fn decode_maps_unrecognized_tags_to_unknown() {
        let decoded = Event::decode(3, 11, "funding_update", "{\"v\":1}").unwrap();
        assert_eq!(
            decoded,
            Event::Unknown {
                seq: 3,
                ts: 11,
                type_tag: "funding_update".to_string()
            }
        );
    }

    #[test]
    fn allocator_is_monotonic_across_clones() {
        let alloc = SeqAllocator::new();
        let clone = alloc.clone();
        assert_eq!(alloc.next(), 1);
        assert_eq!(clone.next(), 2);
        assert_eq!(alloc.next(), 3);
        assert_eq!(alloc.last(), 3);

        let resumed = SeqAllocator::starting_after(41);
        assert_eq!(resumed.next(), 42);
    }
}
