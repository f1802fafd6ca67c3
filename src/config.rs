//! Engine configuration
//!
//! All knobs with defaults good enough for a local paper run, overridable
//! from the environment.

use serde::{Deserialize, Serialize};

use crate::pool::DEFAULT_WARMUP;
use crate::quant::QTY_SCALE;

/// How the binary drives the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Feed live events through the sequencer, appending to the WAL
    Live,
    /// Rebuild state from the WAL and print the final snapshot
    Replay,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // === Storage ===
    /// Path to the SQLite write-ahead event log
    pub database_path: String,

    // === Sequencer ===
    /// Bounded inbox capacity; producers drop on overflow
    pub inbox_capacity: usize,
    /// Largest forward sequence jump tolerated before the run is declared
    /// corrupt. 0 selects strict matching for pure backtests.
    pub gap_tolerance: u64,
    /// Where the post-mortem state dump lands on a fatal condition
    pub dump_path: String,

    // === Event pool ===
    /// Events pre-allocated per variant at startup
    pub pool_warmup: usize,

    // === Strategy ===
    /// Symbol the reference strategy trades
    pub strategy_symbol: String,
    /// Short moving-average period
    pub short_period: usize,
    /// Long moving-average period
    pub long_period: usize,

    // === Demo feed ===
    /// Symbols the synthetic feed publishes
    pub symbols: Vec<String>,
    /// Milliseconds between synthetic ticks
    pub feed_interval_ms: u64,

    // === Balances ===
    /// Asset -> sats credited at bootstrap, before any event is applied
    pub initial_balances: Vec<(String, i64)>,

    // === Mode ===
    pub run_mode: RunMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "data/tickflow.db".to_string(),

            inbox_capacity: 1024,
            gap_tolerance: 10,
            dump_path: "panic_dump.json".to_string(),

            pool_warmup: DEFAULT_WARMUP,

            strategy_symbol: "BTC-KRW".to_string(),
            short_period: 3,
            long_period: 5,

            symbols: vec!["BTC-KRW".to_string(), "ETH-KRW".to_string()],
            feed_interval_ms: 250,

            // 100M KRW of paper funds.
            initial_balances: vec![("KRW".to_string(), 100_000_000 * QTY_SCALE)],

            run_mode: RunMode::Live,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("DATABASE_PATH") {
            config.database_path = v;
        }
        if let Ok(v) = std::env::var("INBOX_CAPACITY") {
            if let Ok(n) = v.parse() {
                config.inbox_capacity = n;
            }
        }
        if let Ok(v) = std::env::var("GAP_TOLERANCE") {
            if let Ok(n) = v.parse() {
                config.gap_tolerance = n;
            }
        }
        if let Ok(v) = std::env::var("DUMP_PATH") {
            config.dump_path = v;
        }
        if let Ok(v) = std::env::var("POOL_WARMUP") {
            if let Ok(n) = v.parse() {
                config.pool_warmup = n;
            }
        }

        if let Ok(v) = std::env::var("STRATEGY_SYMBOL") {
            config.strategy_symbol = v;
        }
        if let Ok(v) = std::env::var("SMA_SHORT_PERIOD") {
            if let Ok(n) = v.parse() {
                config.short_period = n;
            }
        }
        if let Ok(v) = std::env::var("SMA_LONG_PERIOD") {
            if let Ok(n) = v.parse() {
                config.long_period = n;
            }
        }

        if let Ok(v) = std::env::var("SYMBOLS") {
            config.symbols = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = std::env::var("FEED_INTERVAL_MS") {
            if let Ok(n) = v.parse() {
                config.feed_interval_ms = n;
            }
        }

        // INITIAL_BALANCES="KRW=10000000000000000,BTC=0"
        if let Ok(v) = std::env::var("INITIAL_BALANCES") {
            config.initial_balances = v
                .split(',')
                .filter_map(|pair| {
                    let (symbol, amount) = pair.split_once('=')?;
                    Some((symbol.trim().to_string(), amount.trim().parse().ok()?))
                })
                .collect();
        }

        if let Ok(v) = std::env::var("RUN_MODE") {
            match v.to_ascii_lowercase().as_str() {
                "replay" => config.run_mode = RunMode::Replay,
                "live" => config.run_mode = RunMode::Live,
                _ => {}
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let config = Config::default();
        assert!(config.short_period < config.long_period);
        assert!(config.inbox_capacity > 0);
        assert_eq!(config.gap_tolerance, 10);
        assert_eq!(config.run_mode, RunMode::Live);
    }
}
