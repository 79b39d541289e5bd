// =============================================================================
// Scheduler — boundary-aligned candle ingestion and resampling
// =============================================================================
//
// A single free-running loop drives every configured timeframe. Each cycle
// computes the exact delay to the earliest upcoming boundary across the
// schedule and sleeps once; there is no polling and no tolerance window, so
// a boundary fires exactly once even under scheduler jitter.
//
// When several timeframes share a boundary (every 3m close is also a 1m
// close) they fire in the same cycle, shortest window first: base candles
// are ingested before the resamples that consume them, and a resampled 5m
// candle is in the buffer before a 15m resample looks for it. Ticks run to
// completion; nothing else touches the buffer mid-aggregation.
//
// On a base-timeframe boundary the loop fetches a closing candle per symbol
// from the upstream price source, upserts it into the buffer, and emits a
// SignalJob. On a derived-timeframe boundary it reads the constituent
// candles from the buffer and resamples them, silently skipping any symbol
// with an incomplete window.
//
// Failures are contained per (symbol, tick): a fetch or sink error is logged
// and counted, and the loop moves on. Nothing here retries, blocks, or
// panics.

pub mod boundary;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::clock::Clock;
use crate::market_data::{resample, PriceSource};
use crate::signals::{SignalJob, SignalSink};
use crate::types::{Timeframe, PRECEDENCE};

pub struct Scheduler {
    state: Arc<AppState>,
    source: Arc<dyn PriceSource>,
    sink: Arc<dyn SignalSink>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(
        state: Arc<AppState>,
        source: Arc<dyn PriceSource>,
        sink: Arc<dyn SignalSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state,
            source,
            sink,
            clock,
        }
    }

    /// Boundary loop: sleep to the earliest next boundary in the schedule,
    /// fire everything due there, re-arm. Runs until the process exits.
    pub async fn run(&self) {
        info!(schedule = ?self.schedule(), "scheduler started");

        // Tracking the last fired boundary keeps a backwards clock step from
        // firing the same instant twice.
        let mut last_fired = i64::MIN;

        loop {
            let schedule = self.schedule();
            let now = self.clock.now_ms().max(last_fired);

            let Some(next) = schedule
                .iter()
                .map(|tf| boundary::next_boundary(now, *tf))
                .min()
            else {
                // Empty schedule; nothing to do until config changes.
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            };

            let delay = (next - now).max(0) as u64;
            tokio::time::sleep(Duration::from_millis(delay)).await;

            self.fire_boundary(next);
            last_fired = next;
        }
    }

    /// Fire every configured timeframe whose boundary falls on `boundary_ms`,
    /// shortest window first so base candles land before the resamples that
    /// need them.
    pub fn fire_boundary(&self, boundary_ms: i64) {
        for tf in self.schedule() {
            if boundary_ms % tf.duration_ms() == 0 {
                self.fire(tf, boundary_ms);
            }
        }
    }

    /// Configured timeframes in firing order (shortest window first).
    fn schedule(&self) -> Vec<Timeframe> {
        let configured = self.state.runtime_config.read().timeframes.clone();
        PRECEDENCE
            .iter()
            .rev()
            .copied()
            .filter(|tf| configured.contains(tf))
            .collect()
    }

    /// Handle one boundary tick for one timeframe. Never panics and never
    /// returns an error; all failure handling happens inside, per symbol.
    pub fn fire(&self, timeframe: Timeframe, boundary_ms: i64) {
        let config = self.state.runtime_config.read();
        let symbols = config.symbols.clone();
        let is_base = timeframe == config.base_timeframe;
        drop(config);

        debug!(timeframe = %timeframe, boundary_ms, base = is_base, "boundary fired");

        for symbol in &symbols {
            if is_base {
                self.ingest_base(symbol, timeframe, boundary_ms);
            } else {
                self.resample_derived(symbol, timeframe, boundary_ms);
            }
        }
    }

    /// Base timeframe: fetch the closing candle from upstream, store it,
    /// emit a signal.
    fn ingest_base(&self, symbol: &str, timeframe: Timeframe, boundary_ms: i64) {
        let candle = match self.source.fetch_close(symbol, timeframe, boundary_ms) {
            Ok(candle) => candle,
            Err(e) => {
                warn!(symbol, timeframe = %timeframe, error = %e, "upstream fetch failed, skipping symbol");
                self.state
                    .push_error(format!("fetch {symbol}@{timeframe}: {e}"));
                return;
            }
        };

        self.state.candle_buffer.upsert(candle.clone());
        self.emit(candle);
    }

    /// Derived timeframe: look up the constituent candles and resample if
    /// the window is complete.
    fn resample_derived(&self, symbol: &str, timeframe: Timeframe, boundary_ms: i64) {
        let Some((source_tf, _)) = timeframe.constituent() else {
            // Only reachable when the configured base differs from the
            // chain's root; nothing to resample from.
            return;
        };

        let Some(expected) = resample::expected_close_times(timeframe, boundary_ms) else {
            return;
        };

        let mut constituents = Vec::with_capacity(expected.len());
        for close_time in &expected {
            match self.state.candle_buffer.get(symbol, source_tf, *close_time) {
                Some(candle) => constituents.push(candle),
                None => {
                    debug!(
                        symbol,
                        timeframe = %timeframe,
                        missing_close = close_time,
                        "constituent absent, skipping cycle"
                    );
                    self.state.cycles_skipped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        }

        let Some(candle) = resample::resample(timeframe, boundary_ms, &constituents) else {
            self.state.cycles_skipped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        self.state.candle_buffer.upsert(candle.clone());
        self.emit(candle);
    }

    /// Hand a finalized candle to the sink. A refusal is logged and counted,
    /// never retried.
    fn emit(&self, candle: crate::market_data::Candle) {
        let job = SignalJob::for_candle(candle);
        let key = job.idempotency_key.clone();

        match self.sink.enqueue(job) {
            Ok(()) => {
                self.state.signals_emitted.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "signal enqueued");
            }
            Err(e) => {
                self.state.signals_failed.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "signal enqueue failed, dropping");
                self.state.push_error(format!("enqueue {key}: {e}"));
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use parking_lot::Mutex;

    use crate::clock::ManualClock;
    use crate::market_data::{Candle, FlatPriceSource};
    use crate::runtime_config::RuntimeConfig;

    /// Sink that records jobs and can be told to refuse specific symbols.
    struct RecordingSink {
        jobs: Mutex<Vec<SignalJob>>,
        fail_symbol: Option<String>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                jobs: Mutex::new(Vec::new()),
                fail_symbol: None,
            }
        }

        fn failing_for(symbol: &str) -> Self {
            Self {
                jobs: Mutex::new(Vec::new()),
                fail_symbol: Some(symbol.to_string()),
            }
        }

        fn recorded(&self) -> Vec<SignalJob> {
            self.jobs.lock().clone()
        }
    }

    impl SignalSink for RecordingSink {
        fn enqueue(&self, job: SignalJob) -> Result<()> {
            if self.fail_symbol.as_deref() == Some(job.symbol.as_str()) {
                return Err(anyhow!("downstream unavailable"));
            }
            self.jobs.lock().push(job);
            Ok(())
        }
    }

    fn test_scheduler(sink: Arc<RecordingSink>) -> (Scheduler, Arc<AppState>) {
        let config = RuntimeConfig {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            timeframes: vec![Timeframe::M1, Timeframe::M3],
            ..RuntimeConfig::default()
        };
        let state = Arc::new(AppState::new(config));
        let scheduler = Scheduler::new(
            state.clone(),
            Arc::new(FlatPriceSource::new(100.0)),
            sink,
            Arc::new(ManualClock::new(0)),
        );
        (scheduler, state)
    }

    fn minute_candle(symbol: &str, close_time: i64, close: f64, volume: f64) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            timeframe: Timeframe::M1,
            open_time: close_time - 60_000,
            close_time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
        }
    }

    #[test]
    fn base_fire_stores_and_emits_per_symbol() {
        let sink = Arc::new(RecordingSink::new());
        let (scheduler, state) = test_scheduler(sink.clone());

        scheduler.fire(Timeframe::M1, 60_000);

        // Both symbols stored and emitted.
        assert!(state.candle_buffer.get("BTCUSDT", Timeframe::M1, 60_000).is_some());
        assert!(state.candle_buffer.get("ETHUSDT", Timeframe::M1, 60_000).is_some());

        let jobs = sink.recorded();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.timeframe == Timeframe::M1));
        assert_eq!(state.signals_emitted.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn derived_fire_resamples_complete_windows() {
        let sink = Arc::new(RecordingSink::new());
        let (scheduler, state) = test_scheduler(sink.clone());

        state.candle_buffer.upsert(minute_candle("BTCUSDT", 60_000, 10.0, 100.0));
        state.candle_buffer.upsert(minute_candle("BTCUSDT", 120_000, 11.0, 200.0));
        state.candle_buffer.upsert(minute_candle("BTCUSDT", 180_000, 12.0, 300.0));

        scheduler.fire(Timeframe::M3, 180_000);

        let derived = state
            .candle_buffer
            .get("BTCUSDT", Timeframe::M3, 180_000)
            .unwrap();
        assert_eq!(derived.open, 10.0);
        assert_eq!(derived.close, 12.0);
        assert_eq!(derived.volume, 600.0);
        assert_eq!(derived.open_time, 0);

        // ETHUSDT had no constituents: exactly one job, one skip.
        let jobs = sink.recorded();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].symbol, "BTCUSDT");
        assert_eq!(jobs[0].timeframe, Timeframe::M3);
        assert_eq!(state.cycles_skipped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn missing_constituent_skips_without_emitting() {
        let sink = Arc::new(RecordingSink::new());
        let (scheduler, state) = test_scheduler(sink.clone());

        // Only two of the three 1m candles exist.
        state.candle_buffer.upsert(minute_candle("BTCUSDT", 60_000, 10.0, 100.0));
        state.candle_buffer.upsert(minute_candle("BTCUSDT", 180_000, 12.0, 300.0));

        scheduler.fire(Timeframe::M3, 180_000);

        assert!(state.candle_buffer.get("BTCUSDT", Timeframe::M3, 180_000).is_none());
        assert!(sink.recorded().is_empty());
        assert_eq!(state.signals_emitted.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn sink_failure_for_one_symbol_does_not_suppress_others() {
        let sink = Arc::new(RecordingSink::failing_for("BTCUSDT"));
        let (scheduler, state) = test_scheduler(sink.clone());

        scheduler.fire(Timeframe::M1, 60_000);

        let jobs = sink.recorded();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].symbol, "ETHUSDT");
        assert_eq!(state.signals_emitted.load(Ordering::Relaxed), 1);
        assert_eq!(state.signals_failed.load(Ordering::Relaxed), 1);
        // Buffer state is unaffected by the emit failure.
        assert!(state.candle_buffer.get("BTCUSDT", Timeframe::M1, 60_000).is_some());
        assert!(!state.recent_errors.read().is_empty());
    }

    #[test]
    fn shared_boundary_ingests_base_before_resampling() {
        let sink = Arc::new(RecordingSink::new());
        let (scheduler, state) = test_scheduler(sink.clone());

        // Two of the three 1m constituents exist per symbol; the third
        // closes at the shared 180s boundary and is ingested by the same
        // cycle.
        for symbol in ["BTCUSDT", "ETHUSDT"] {
            state.candle_buffer.upsert(minute_candle(symbol, 60_000, 10.0, 100.0));
            state.candle_buffer.upsert(minute_candle(symbol, 120_000, 11.0, 200.0));
        }

        scheduler.fire_boundary(180_000);

        // The 3m resample saw the 1m candle ingested in the same cycle.
        let derived = state
            .candle_buffer
            .get("BTCUSDT", Timeframe::M3, 180_000)
            .unwrap();
        assert_eq!(derived.close, 100.0);

        // Jobs arrive base first, derived second.
        let jobs = sink.recorded();
        let tfs: Vec<Timeframe> = jobs.iter().map(|j| j.timeframe).collect();
        assert_eq!(
            tfs,
            vec![
                Timeframe::M1,
                Timeframe::M1,
                Timeframe::M3,
                Timeframe::M3
            ]
        );
    }

    #[test]
    fn non_shared_boundary_fires_base_only() {
        let sink = Arc::new(RecordingSink::new());
        let (scheduler, _state) = test_scheduler(sink.clone());

        // 120s is a 1m boundary but not a 3m boundary.
        scheduler.fire_boundary(120_000);

        let jobs = sink.recorded();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.timeframe == Timeframe::M1));
    }

    #[test]
    fn emitted_close_times_sit_on_exact_boundaries() {
        let sink = Arc::new(RecordingSink::new());
        let (scheduler, _state) = test_scheduler(sink.clone());

        for i in 1..=3 {
            scheduler.fire_boundary(i * 60_000);
        }

        let jobs = sink.recorded();
        assert!(!jobs.is_empty());
        for job in jobs {
            let ms = job.close_time.timestamp_millis();
            assert_eq!(ms % job.timeframe.duration_ms(), 0);
        }
    }
}
