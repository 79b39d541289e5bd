// =============================================================================
// Central Application State — Tickfold Candle Engine
// =============================================================================
//
// The single source of truth shared by every async task via `Arc<AppState>`.
//
// Thread safety:
//   - Atomic counters for lock-free signal/cycle accounting.
//   - parking_lot::RwLock for mutable shared collections.
//   - The candle buffer manages its own interior mutability.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::market_data::CandleBuffer;
use crate::runtime_config::RuntimeConfig;

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

/// A recorded error event, kept in a small in-memory ring for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Human-readable error message.
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Central engine state.
pub struct AppState {
    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: RwLock<RuntimeConfig>,

    // ── Market Data ─────────────────────────────────────────────────────
    pub candle_buffer: Arc<CandleBuffer>,

    // ── Signal accounting ───────────────────────────────────────────────
    /// Jobs successfully handed to the sink.
    pub signals_emitted: AtomicU64,
    /// Jobs the sink refused (queue full/closed); never retried.
    pub signals_failed: AtomicU64,
    /// Jobs the dispatcher dropped as duplicates within the dedup window.
    pub signals_deduped: AtomicU64,
    /// Derived-timeframe cycles skipped for missing constituents.
    pub cycles_skipped: AtomicU64,

    // ── Error Log ───────────────────────────────────────────────────────
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    // ── Timing ──────────────────────────────────────────────────────────
    /// Instant when the engine was started. Used for uptime reporting.
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Construct state from the given runtime configuration. The returned
    /// value is typically wrapped in `Arc` immediately.
    pub fn new(config: RuntimeConfig) -> Self {
        let candle_buffer = Arc::new(CandleBuffer::new(config.max_candles_per_series));

        Self {
            runtime_config: RwLock::new(config),
            candle_buffer,
            signals_emitted: AtomicU64::new(0),
            signals_failed: AtomicU64::new(0),
            signals_deduped: AtomicU64::new(0),
            cycles_skipped: AtomicU64::new(0),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    /// Record an error message. The ring buffer is capped at
    /// [`MAX_RECENT_ERRORS`]; oldest entries are evicted first.
    pub fn push_error(&self, msg: String) {
        let record = ErrorRecord {
            message: msg,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
    }

    /// Snapshot of the signal/cycle counters for the periodic stats log.
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            signals_emitted: self.signals_emitted.load(Ordering::Relaxed),
            signals_failed: self.signals_failed.load(Ordering::Relaxed),
            signals_deduped: self.signals_deduped.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            buffered_candles: self.candle_buffer.total_len(),
        }
    }
}

/// Counter snapshot logged by the heartbeat loop.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub signals_emitted: u64,
    pub signals_failed: u64,
    pub signals_deduped: u64,
    pub cycles_skipped: u64,
    pub buffered_candles: usize,
}
