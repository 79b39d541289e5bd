// =============================================================================
// Signal Dispatcher — in-process consumer with an idempotency dedup window
// =============================================================================
//
// Drains the bounded signal channel and enforces at-most-once processing per
// idempotency key within a time window: a key seen again inside the window is
// dropped and counted, everything else is processed (here: logged with its
// post-close latency). Delivery mechanics beyond dedup live downstream and
// are out of this engine's hands.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::app_state::AppState;
use crate::clock::Clock;
use crate::signals::SignalJob;
use crate::types::Timeframe;

/// Seen-key map is pruned once it grows past this many entries.
const PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Processed,
    Deduplicated,
}

pub struct SignalDispatcher {
    state: Arc<AppState>,
    clock: Arc<dyn Clock>,
    /// idempotency key -> last processed at (epoch ms).
    seen: RwLock<HashMap<String, i64>>,
}

impl SignalDispatcher {
    pub fn new(state: Arc<AppState>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state,
            clock,
            seen: RwLock::new(HashMap::new()),
        }
    }

    /// Drain the channel until every sender is gone. Spawned once at engine
    /// startup.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<SignalJob>) {
        info!("signal dispatcher started");

        while let Some(job) = rx.recv().await {
            match self.process(&job) {
                DispatchOutcome::Processed => {
                    let latency_ms = self.clock.now_ms() - job.close_time.timestamp_millis();
                    info!(
                        key = %job.idempotency_key,
                        symbol = %job.symbol,
                        timeframe = %job.timeframe,
                        close = job.payload.candle.close,
                        latency_ms,
                        "signal processed"
                    );
                }
                DispatchOutcome::Deduplicated => {
                    debug!(key = %job.idempotency_key, "duplicate signal dropped");
                }
            }
        }

        info!("signal channel closed, dispatcher stopping");
    }

    /// Apply the dedup window to one job.
    pub fn process(&self, job: &SignalJob) -> DispatchOutcome {
        let now = self.clock.now_ms();
        let window = self.dedup_window_ms(job.timeframe);

        {
            let seen = self.seen.read();
            if let Some(&last) = seen.get(&job.idempotency_key) {
                if now - last < window {
                    self.state.signals_deduped.fetch_add(1, Ordering::Relaxed);
                    return DispatchOutcome::Deduplicated;
                }
            }
        }

        let mut seen = self.seen.write();
        seen.insert(job.idempotency_key.clone(), now);

        if seen.len() > PRUNE_THRESHOLD {
            // Entries older than the widest possible window can never dedup
            // anything again.
            let horizon = self.max_window_ms();
            seen.retain(|_, last| now - *last < horizon);
        }

        DispatchOutcome::Processed
    }

    fn dedup_window_ms(&self, timeframe: Timeframe) -> i64 {
        match self.state.runtime_config.read().dedup_window_secs {
            Some(secs) => secs as i64 * 1000,
            None => timeframe.duration_ms(),
        }
    }

    fn max_window_ms(&self) -> i64 {
        match self.state.runtime_config.read().dedup_window_secs {
            Some(secs) => secs as i64 * 1000,
            None => Timeframe::H4.duration_ms(),
        }
    }
}
