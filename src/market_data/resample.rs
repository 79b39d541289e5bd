// =============================================================================
// Resampler — derive a higher-timeframe candle from its constituents
// =============================================================================
//
// Deterministic N:1 aggregation: open from the first constituent, close from
// the last, high/low as the extremes, volume as the sum. Works for any
// adjacent pair in the timeframe chain (1m -> 3m is the canonical case; the
// same semantics cover 5m -> 15m, 1h -> 4h, ...).
//
// If any required constituent is missing the whole cycle is skipped: no
// partial or zero-filled candle is produced, and the boundary is never
// retried later.

use crate::market_data::Candle;
use crate::types::Timeframe;

/// The close times of the constituents expected for `target` closing at
/// `boundary_ms`, oldest first. `None` if `target` is the base timeframe.
pub fn expected_close_times(target: Timeframe, boundary_ms: i64) -> Option<Vec<i64>> {
    let (source, ratio) = target.constituent()?;
    let step = source.duration_ms();
    Some(
        (0..ratio)
            .map(|i| boundary_ms - (ratio - 1 - i) as i64 * step)
            .collect(),
    )
}

/// Combine `constituents` (oldest first, one per expected sub-boundary) into
/// one `target` candle closing at `boundary_ms`.
///
/// Returns `None` unless exactly the expected number of constituents is
/// supplied; insufficient data is a valid, silent outcome, not an error.
pub fn resample(target: Timeframe, boundary_ms: i64, constituents: &[Candle]) -> Option<Candle> {
    let (_, ratio) = target.constituent()?;
    if constituents.len() != ratio {
        return None;
    }

    let first = constituents.first()?;
    let last = constituents.last()?;

    let mut high = f64::MIN;
    let mut low = f64::MAX;
    let mut volume = 0.0;
    for c in constituents {
        high = high.max(c.high);
        low = low.min(c.low);
        volume += c.volume;
    }

    Some(Candle {
        symbol: first.symbol.clone(),
        timeframe: target,
        open_time: first.open_time,
        close_time: boundary_ms,
        open: first.open,
        high,
        low,
        close: last.close,
        volume,
    })
}
