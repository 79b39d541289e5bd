// =============================================================================
// Signals Module
// =============================================================================
//
// Candle-close signal pipeline:
// - SignalJob construction with deterministic idempotency keys
// - SignalSink handoff boundary (bounded channel implementation)
// - In-process dispatcher enforcing the dedup window

pub mod dispatch;
pub mod job;
pub mod sink;

pub use dispatch::{DispatchOutcome, SignalDispatcher};
pub use job::{idempotency_key, SignalJob, SignalPayload};
pub use sink::{ChannelSink, SignalSink};
