// =============================================================================
// Signal Sink — the handoff boundary to downstream delivery
// =============================================================================
//
// The scheduler hands every finalized candle close to a `SignalSink` and
// inspects the result: a failure is logged and counted, never retried and
// never propagated. What happens past the sink (queues, delivery, fan-out)
// is the consumer's concern.

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;

use crate::signals::SignalJob;

pub trait SignalSink: Send + Sync {
    fn enqueue(&self, job: SignalJob) -> Result<()>;
}

/// Sink backed by a bounded in-process channel.
///
/// `try_send` keeps the scheduler's tick handler non-blocking: a full or
/// closed channel surfaces as the "downstream unavailable" error case.
pub struct ChannelSink {
    tx: mpsc::Sender<SignalJob>,
}

impl ChannelSink {
    /// Create the sink plus the receiver half for a dispatcher task.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<SignalJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl SignalSink for ChannelSink {
    fn enqueue(&self, job: SignalJob) -> Result<()> {
        self.tx
            .try_send(job)
            .map_err(|e| anyhow!("signal queue unavailable: {e}"))
    }
}
