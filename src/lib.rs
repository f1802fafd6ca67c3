//! Tickflow - deterministic event engine for crypto quant trading
//!
//! A single-writer sequencer owns all mutable market state. Exchange
//! gateways stamp events from a shared monotonic sequence source and
//! submit them through a bounded inbox; the sequencer validates ordering,
//! persists write-ahead, applies the update, runs the strategy, and
//! notifies observers. Replaying the persisted log through a fresh
//! sequencer reproduces state bit-identically.
//!
//! ## Architecture
//!
//! - **Events**: closed sum type with a versioned on-disk encoding
//! - **Write-ahead log**: SQLite in WAL mode, append-before-mutate
//! - **Numerics**: 64-bit fixed point (micros/sats), checked everywhere
//! - **Strategy**: synchronous hook on the hot path, reference SMA cross
//! - **Recovery**: fatal conditions dump state and terminate; the
//!   replayer rebuilds from the log on restart

pub mod config;
pub mod domain;
pub mod error;
pub mod event;
pub mod feed;
pub mod pool;
pub mod quant;
pub mod replay;
pub mod safe;
pub mod sequencer;
pub mod store;
pub mod strategy;

pub use config::{Config, RunMode};
pub use domain::{Balance, BalanceBook, MarketState, OrderStatus, Side};
pub use error::{EngineError, Result};
pub use event::{Event, MarketUpdate, OrderUpdate, SeqAllocator};
pub use pool::EventPool;
pub use replay::Replayer;
pub use sequencer::{MarketReader, Sequencer};
pub use store::EventStore;
pub use strategy::{Action, ActionKind, SmaCrossStrategy, Strategy};
