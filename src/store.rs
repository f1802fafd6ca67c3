//! Write-ahead event log
//!
//! SQLite-backed, append-only, ordered by sequence number. The store is
//! the system of record: the sequencer persists here before mutating any
//! state, and the replayer reconstructs state from here after a crash.
//!
//! The database runs in WAL journal mode with `synchronous=NORMAL`, so an
//! `append` is durable from the caller's perspective without paying a
//! full fsync per event.

use std::collections::VecDeque;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::error::Result;
use crate::event::Event;
use crate::quant::{Seq, TimeStamp};

const FETCH_BATCH: usize = 256;

/// Durable, ordered event store keyed by sequence number
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// Open (creating if needed) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self { conn };
        store.create_tables()?;

        info!(path = %path.display(), "event store opened");
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq      INTEGER PRIMARY KEY,
                ts       INTEGER NOT NULL,
                type_tag TEXT    NOT NULL,
                payload  TEXT    NOT NULL
            );

            CREATE TABLE IF NOT EXISTS metadata (
                key   TEXT PRIMARY KEY,
                value TEXT,
                ts    INTEGER
            );
            "#,
        )?;
        Ok(())
    }

    /// Persist one event, durably and in order.
    ///
    /// Fails on any SQLite error, including a duplicate sequence number
    /// (the primary key is the ordering guarantee). The sequencer treats
    /// every failure here as fatal.
    pub fn append(&self, ev: &Event) -> Result<()> {
        let payload = ev.encode_payload()?;
        self.conn.execute(
            "INSERT INTO events (seq, ts, type_tag, payload) VALUES (?1, ?2, ?3, ?4)",
            params![ev.seq() as i64, ev.ts(), ev.type_tag(), payload],
        )?;
        Ok(())
    }

    /// Largest persisted sequence number, or 0 when empty
    pub fn latest_seq(&self) -> Result<Seq> {
        let max: i64 =
            self.conn
                .query_row("SELECT COALESCE(MAX(seq), 0) FROM events", [], |row| {
                    row.get(0)
                })?;
        Ok(max as Seq)
    }

    /// Number of persisted events
    pub fn event_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Lazy iteration over events with `seq >= from_seq`, ascending.
    ///
    /// Rows are fetched in batches, so the cursor can cover a WAL far
    /// larger than memory and is restartable from any sequence number.
    pub fn iterate_from(&self, from_seq: Seq) -> EventIter<'_> {
        EventIter {
            store: self,
            next_seq: from_seq,
            buffered: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Upsert a key/value pair in the metadata side channel
    pub fn upsert_metadata(&self, key: &str, value: &str, ts: TimeStamp) -> Result<()> {
        self.conn.execute(
            "INSERT INTO metadata (key, value, ts) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, ts = excluded.ts",
            params![key, value, ts],
        )?;
        Ok(())
    }

    /// Look up a metadata value; `None` when the key was never written
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }
}

/// Batched cursor over persisted events
pub struct EventIter<'a> {
    store: &'a EventStore,
    next_seq: Seq,
    buffered: VecDeque<Result<Event>>,
    exhausted: bool,
}

impl EventIter<'_> {
    fn refill(&mut self) {
        let fetch = || -> Result<Vec<(Seq, TimeStamp, String, String)>> {
            let mut stmt = self.store.conn.prepare_cached(
                "SELECT seq, ts, type_tag, payload FROM events
                 WHERE seq >= ?1 ORDER BY seq LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![self.next_seq as i64, FETCH_BATCH as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)? as Seq,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
        };

        match fetch() {
            Ok(rows) => {
                if rows.len() < FETCH_BATCH {
                    self.exhausted = true;
                }
                for (seq, ts, type_tag, payload) in rows {
                    self.next_seq = seq + 1;
                    self.buffered
                        .push_back(Event::decode(seq, ts, &type_tag, &payload));
                }
            }
            Err(err) => {
                self.exhausted = true;
                self.buffered.push_back(Err(err));
            }
        }
    }
}

impl Iterator for EventIter<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.exhausted {
            self.refill();
        }
        self.buffered.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::event::{MarketUpdate, TAG_MARKET_UPDATE};
    use tempfile::tempdir;

    fn market_event(seq: Seq, price_micros: i64) -> Event {
        Event::MarketUpdate(MarketUpdate {
            seq,
            ts: 1_000 * seq as i64,
            symbol: "BTC-KRW".to_string(),
            price_micros,
            qty_sats: 100_000_000,
            exchange: "UPBIT".to_string(),
        })
    }

    #[test]
    fn append_then_iterate_round_trips_in_order() {
        let dir = tempdir().unwrap();
        let store = EventStore::open(dir.path().join("events.db")).unwrap();

        for seq in 1..=5 {
            store.append(&market_event(seq, seq as i64 * 10)).unwrap();
        }
        assert_eq!(store.latest_seq().unwrap(), 5);
        assert_eq!(store.event_count().unwrap(), 5);

        let seqs: Vec<Seq> = store
            .iterate_from(1)
            .map(|item| item.unwrap().seq())
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);

        // Restartable from the middle.
        let tail: Vec<Seq> = store
            .iterate_from(4)
            .map(|item| item.unwrap().seq())
            .collect();
        assert_eq!(tail, vec![4, 5]);
    }

    #[test]
    fn iteration_spans_multiple_batches() {
        let dir = tempdir().unwrap();
        let store = EventStore::open(dir.path().join("events.db")).unwrap();

        let total = FETCH_BATCH as u64 * 2 + 7;
        for seq in 1..=total {
            store.append(&market_event(seq, 1)).unwrap();
        }

        let count = store.iterate_from(1).map(|item| item.unwrap()).count();
        assert_eq!(count as u64, total);
    }

    #[test]
    fn duplicate_seq_is_rejected() {
        let dir = tempdir().unwrap();
        let store = EventStore::open(dir.path().join("events.db")).unwrap();

        store.append(&market_event(1, 10)).unwrap();
        let err = store.append(&market_event(1, 20)).unwrap_err();
        assert!(matches!(err, EngineError::Storage(_)));
        assert_eq!(store.event_count().unwrap(), 1);
    }

    #[test]
    fn latest_seq_is_zero_when_empty() {
        let dir = tempdir().unwrap();
        let store = EventStore::open(dir.path().join("events.db")).unwrap();
        assert_eq!(store.latest_seq().unwrap(), 0);
    }

    #[test]
    fn unsupported_payload_version_surfaces_as_error() {
        let dir = tempdir().unwrap();
        let store = EventStore::open(dir.path().join("events.db")).unwrap();

        store
            .conn
            .execute(
                "INSERT INTO events (seq, ts, type_tag, payload) VALUES (1, 0, ?1, '{\"v\":99}')",
                [TAG_MARKET_UPDATE],
            )
            .unwrap();

        let items: Vec<Result<Event>> = store.iterate_from(1).collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(
            items[0],
            Err(EngineError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn unknown_type_tag_survives_the_round_trip() {
        let dir = tempdir().unwrap();
        let store = EventStore::open(dir.path().join("events.db")).unwrap();

        let unknown = Event::Unknown {
            seq: 1,
            ts: 5,
            type_tag: "funding_update".to_string(),
        };
        store.append(&unknown).unwrap();

        let decoded = store.iterate_from(1).next().unwrap().unwrap();
        assert_eq!(decoded, unknown);
    }

    #[test]
    fn metadata_upsert_and_get() {
        let dir = tempdir().unwrap();
        let store = EventStore::open(dir.path().join("events.db")).unwrap();

        assert_eq!(store.get_metadata("icon_path").unwrap(), None);
        store.upsert_metadata("icon_path", "/tmp/btc.png", 100).unwrap();
        store.upsert_metadata("icon_path", "/tmp/btc2.png", 200).unwrap();
        assert_eq!(
            store.get_metadata("icon_path").unwrap(),
            Some("/tmp/btc2.png".to_string())
        );
    }
}
