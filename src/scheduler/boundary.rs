// =============================================================================
// Boundary arithmetic — wall-clock alignment for timeframe windows
// =============================================================================
//
// A boundary is a multiple of the timeframe duration since the Unix epoch:
// a 3m window closes exactly at :00, :03, :06, ... regardless of when the
// process started. All scheduling decisions reduce to these two functions.

use crate::types::Timeframe;

/// Largest boundary of `timeframe` at or before `now_ms`.
pub fn floor_to_boundary(now_ms: i64, timeframe: Timeframe) -> i64 {
    let step = timeframe.duration_ms();
    now_ms.div_euclid(step) * step
}

/// Smallest boundary of `timeframe` strictly after `now_ms`.
pub fn next_boundary(now_ms: i64, timeframe: Timeframe) -> i64 {
    floor_to_boundary(now_ms, timeframe) + timeframe.duration_ms()
}
