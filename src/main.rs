//! Tickflow bootstrap
//!
//! Wires the engine together for a local paper run: open the write-ahead
//! log, recover state if the log is non-empty, start the sequencer and
//! the synthetic feed, and drain strategy actions until Ctrl-C. With
//! `RUN_MODE=replay` it instead rebuilds state from the log and prints
//! the final snapshot.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tickflow::{
    feed, Config, EventPool, EventStore, Replayer, RunMode, SeqAllocator, Sequencer,
    SmaCrossStrategy,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let config = Config::from_env();
    info!(
        db = %config.database_path,
        mode = ?config.run_mode,
        gap_tolerance = config.gap_tolerance,
        "tickflow starting"
    );

    match config.run_mode {
        RunMode::Live => run_live(config).await,
        RunMode::Replay => run_replay(config).await,
    }
}

async fn run_live(config: Config) -> anyhow::Result<()> {
    let store = EventStore::open(&config.database_path).context("open event store")?;
    store.upsert_metadata(
        "engine_started_at",
        &chrono::Utc::now().to_rfc3339(),
        chrono::Utc::now().timestamp_micros(),
    )?;

    let pool = Arc::new(EventPool::new());
    pool.warm_up(config.pool_warmup);

    let strategy = SmaCrossStrategy::new(
        &config.strategy_symbol,
        config.short_period,
        config.long_period,
    )?;

    let (action_tx, mut action_rx) = mpsc::channel(256);
    let mut sequencer = Sequencer::new(&config, Some(store), Some(Box::new(strategy)))
        .with_action_sink(action_tx)
        .with_pool(pool.clone());
    for (symbol, amount_sats) in &config.initial_balances {
        sequencer.seed_balance(symbol, *amount_sats);
    }

    // Crash recovery: rebuild state from whatever the log already holds,
    // then let producers continue numbering where it left off.
    let recovery_store = EventStore::open(&config.database_path)?;
    let recovered = Replayer::new(&recovery_store).replay_into(&mut sequencer)?;
    let last_seq = recovery_store.latest_seq()?;
    drop(recovery_store);
    if recovered > 0 {
        info!(recovered, last_seq, "state recovered from write-ahead log");
    }

    let inbox = sequencer.inbox();
    let reader = sequencer.market_reader();
    let seqs = SeqAllocator::starting_after(last_seq);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sequencer_task = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move {
            sequencer.run(shutdown).await;
            sequencer
        }
    });

    let feed_task = tokio::spawn(feed::run_synthetic(
        pool,
        seqs,
        inbox,
        config.symbols.clone(),
        config.feed_interval_ms,
        shutdown_rx,
    ));

    let action_task = tokio::spawn(async move {
        while let Some(action) = action_rx.recv().await {
            info!(
                kind = %action.kind,
                symbol = %action.symbol,
                price = action.price_micros,
                qty = action.qty_sats,
                "action emitted"
            );
        }
    });

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutdown signal received");
    shutdown_tx.send(true).ok();

    feed_task.await?;
    let sequencer = sequencer_task.await?;
    action_task.abort();

    for (symbol, state) in reader.snapshot() {
        info!(
            symbol = %symbol,
            price = state.price_micros,
            qty = state.total_qty_sats,
            "final market state"
        );
    }
    for (symbol, balance) in sequencer.balance_snapshot() {
        info!(
            symbol = %symbol,
            amount = balance.amount_sats,
            reserved = balance.reserved_sats,
            "final balance"
        );
    }

    info!("tickflow stopped");
    Ok(())
}

async fn run_replay(config: Config) -> anyhow::Result<()> {
    let store = EventStore::open(&config.database_path).context("open event store")?;

    let strategy = SmaCrossStrategy::new(
        &config.strategy_symbol,
        config.short_period,
        config.long_period,
    )?;
    let mut sequencer = Sequencer::new(&config, None, Some(Box::new(strategy)));
    for (symbol, amount_sats) in &config.initial_balances {
        sequencer.seed_balance(symbol, *amount_sats);
    }

    let applied = Replayer::new(&store).replay_into(&mut sequencer)?;

    let snapshot = sequencer.market_reader().snapshot();
    for (symbol, state) in &snapshot {
        info!(
            symbol = %symbol,
            price = state.price_micros,
            qty = state.total_qty_sats,
            last_update = state.last_update_ts,
            "replayed market state"
        );
    }
    info!(applied, markets = snapshot.len(), "replay finished");
    Ok(())
}
