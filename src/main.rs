// =============================================================================
// Tickfold Candle Engine — Main Entry Point
// =============================================================================
//
// Headless background engine: boundary-aligned candle ingestion, N:1
// resampling into higher timeframes, and idempotent candle-close signals.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod app_state;
mod clock;
mod market_data;
mod runtime_config;
mod scheduler;
mod signals;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::clock::SystemClock;
use crate::market_data::FlatPriceSource;
use crate::runtime_config::RuntimeConfig;
use crate::scheduler::Scheduler;
use crate::signals::{ChannelSink, SignalDispatcher};

const CONFIG_PATH: &str = "runtime_config.json";
const STATS_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Tickfold candle engine starting up");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override symbols from env if available.
    if let Ok(syms) = std::env::var("TICKFOLD_SYMBOLS") {
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if config.symbols.is_empty() {
        config.symbols = vec!["BTCUSDT".into(), "ETHUSDT".into()];
    }

    if config.ensure_base_scheduled() {
        warn!(base = %config.base_timeframe, "base timeframe was missing from the schedule, added");
    }
    for (derived, source) in config.untracked_sources() {
        warn!(
            timeframe = %derived,
            source = %source,
            "derived timeframe's source series is not tracked, its cycles will always skip"
        );
    }

    info!(
        symbols = ?config.symbols,
        timeframes = ?config.timeframes,
        base = %config.base_timeframe,
        "Configured schedule"
    );

    // ── 2. Shared state ──────────────────────────────────────────────────
    let flat_price = config.flat_price;
    let queue_capacity = config.signal_queue_capacity;
    let state = Arc::new(AppState::new(config));
    let clock = Arc::new(SystemClock);

    // ── 3. Signal pipeline ───────────────────────────────────────────────
    let (sink, rx) = ChannelSink::bounded(queue_capacity);
    let dispatcher = Arc::new(SignalDispatcher::new(state.clone(), clock.clone()));
    tokio::spawn(dispatcher.run(rx));

    // ── 4. Scheduler loop ────────────────────────────────────────────────
    let scheduler = Scheduler::new(
        state.clone(),
        Arc::new(FlatPriceSource::new(flat_price)),
        Arc::new(sink),
        clock,
    );
    tokio::spawn(async move {
        scheduler.run().await;
    });
    info!("Boundary scheduler launched");

    // ── 5. Stats heartbeat ───────────────────────────────────────────────
    let stats_state = state.clone();
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(tokio::time::Duration::from_secs(STATS_INTERVAL_SECS));
        // The first interval tick completes immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = stats_state.stats();
            info!(
                uptime_secs = stats.uptime_secs,
                emitted = stats.signals_emitted,
                failed = stats.signals_failed,
                deduped = stats.signals_deduped,
                skipped = stats.cycles_skipped,
                buffered = stats.buffered_candles,
                "engine stats"
            );
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, stopping");

    if let Err(e) = state.runtime_config.read().save(CONFIG_PATH) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    let stats = state.stats();
    info!(
        emitted = stats.signals_emitted,
        failed = stats.signals_failed,
        "Tickfold shut down complete"
    );
    Ok(())
}
