//! Event replay
//!
//! Drives a freshly constructed sequencer from the write-ahead log,
//! exercising the exact state-update and strategy path the live run used,
//! minus the re-append. Identical event streams produce bit-identical
//! market state; that equality is the engine's recovery and backtesting
//! guarantee.

use tracing::info;

use crate::error::Result;
use crate::sequencer::Sequencer;
use crate::store::EventStore;

/// Replays persisted events into a sequencer
pub struct Replayer<'a> {
    store: &'a EventStore,
}

impl<'a> Replayer<'a> {
    pub fn new(store: &'a EventStore) -> Self {
        Self { store }
    }

    /// Feed every persisted event, in order, through
    /// [`Sequencer::replay_event`]. Returns the number of events applied.
    ///
    /// A missing sequence number in the log is the durable trace of a gap
    /// the live run tolerated, so the cursor fast-forwards the sequencer
    /// across it before applying the next event. Must not run while the
    /// sequencer's live loop is active.
    pub fn replay_into(&self, sequencer: &mut Sequencer) -> Result<u64> {
        let mut applied: u64 = 0;
        for item in self.store.iterate_from(1) {
            let ev = item?;
            if ev.seq() > sequencer.next_seq() {
                sequencer.fast_forward_to(ev.seq());
            }
            sequencer.replay_event(ev);
            applied += 1;
        }
        info!(applied, "replay complete");
        Ok(applied)
    }
}
