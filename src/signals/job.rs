// =============================================================================
// Signal Job — one candle-close event bound for downstream consumers
// =============================================================================

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::market_data::Candle;
use crate::types::Timeframe;

/// A unit of work describing one finalized candle close.
///
/// `idempotency_key` is deterministic over (symbol, timeframe, close_time),
/// so repeated emissions for the same boundary are recognisable as duplicates
/// by any downstream consumer. `job_id` is per-emission and exists only for
/// tracing individual deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalJob {
    pub job_id: Uuid,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub close_time: DateTime<Utc>,
    pub idempotency_key: String,
    pub payload: SignalPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalPayload {
    pub candle: Candle,
}

impl SignalJob {
    /// Build the job for a just-finalized candle.
    pub fn for_candle(candle: Candle) -> Self {
        let close_time = DateTime::from_timestamp_millis(candle.close_time)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self {
            job_id: Uuid::new_v4(),
            symbol: candle.symbol.clone(),
            timeframe: candle.timeframe,
            idempotency_key: idempotency_key(&candle.symbol, candle.timeframe, close_time),
            close_time,
            payload: SignalPayload { candle },
        }
    }
}

/// Deterministic key: `{symbol}-{timeframe}-{closeTime ISO-8601}`.
pub fn idempotency_key(symbol: &str, timeframe: Timeframe, close_time: DateTime<Utc>) -> String {
    format!(
        "{symbol}-{timeframe}-{}",
        close_time.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}
