// =============================================================================
// Candle Buffer — latest known candle per (symbol, timeframe, close time)
// =============================================================================
//
// Process-wide store written by the scheduler on every boundary fire and read
// back when a higher timeframe is resampled. One candle per key: upserting an
// existing (symbol, timeframe, close_time) replaces the stored candle wholly.
// Absence is a normal state (e.g. before the first tick populates a slot),
// never an error.
//
// Each (symbol, timeframe) series is capped at `max_per_series`; the oldest
// close_time is evicted first once the cap is exceeded.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::Timeframe;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV candle for one symbol over one timeframe window.
///
/// `close_time` is the right edge of the window (a multiple of the timeframe
/// duration since the epoch); `open_time` is the left edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Identifies one candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

// ---------------------------------------------------------------------------
// CandleBuffer
// ---------------------------------------------------------------------------

/// Thread-safe map from (symbol, timeframe) to its stored candles, keyed by
/// close time within each series.
pub struct CandleBuffer {
    series: RwLock<HashMap<SeriesKey, BTreeMap<i64, Candle>>>,
    max_per_series: usize,
}

impl CandleBuffer {
    /// Create a buffer retaining at most `max_per_series` candles per
    /// (symbol, timeframe) series.
    pub fn new(max_per_series: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            max_per_series: max_per_series.max(1),
        }
    }

    /// Store or overwrite the candle at its (symbol, timeframe, close_time)
    /// key. Last writer wins; the previous candle at that key, if any, is
    /// replaced entirely.
    pub fn upsert(&self, candle: Candle) {
        let key = SeriesKey::new(candle.symbol.clone(), candle.timeframe);
        let mut map = self.series.write();
        let ring = map.entry(key).or_default();
        ring.insert(candle.close_time, candle);

        // Evict oldest close times once over budget.
        while ring.len() > self.max_per_series {
            let oldest = match ring.keys().next() {
                Some(&t) => t,
                None => break,
            };
            ring.remove(&oldest);
        }
    }

    /// Exact lookup by (symbol, timeframe, close_time).
    pub fn get(&self, symbol: &str, timeframe: Timeframe, close_time: i64) -> Option<Candle> {
        let map = self.series.read();
        map.get(&SeriesKey::new(symbol, timeframe))
            .and_then(|ring| ring.get(&close_time))
            .cloned()
    }

    /// The most recently closed candle stored for a series, if any.
    pub fn latest(&self, symbol: &str, timeframe: Timeframe) -> Option<Candle> {
        let map = self.series.read();
        map.get(&SeriesKey::new(symbol, timeframe))
            .and_then(|ring| ring.values().next_back())
            .cloned()
    }

    /// Number of candles currently stored for a series.
    pub fn series_len(&self, symbol: &str, timeframe: Timeframe) -> usize {
        let map = self.series.read();
        map.get(&SeriesKey::new(symbol, timeframe))
            .map_or(0, BTreeMap::len)
    }

    /// Total number of candles across all series.
    pub fn total_len(&self) -> usize {
        let map = self.series.read();
        map.values().map(BTreeMap::len).sum()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candle(symbol: &str, tf: Timeframe, close_time: i64, close: f64) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            timeframe: tf,
            open_time: close_time - tf.duration_ms(),
            close_time,
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn upsert_then_get_returns_exact_candle() {
        let buf = CandleBuffer::new(10);
        let candle = sample_candle("BTCUSDT", Timeframe::M1, 60_000, 50_000.0);
        buf.upsert(candle.clone());
        assert_eq!(buf.get("BTCUSDT", Timeframe::M1, 60_000), Some(candle));
    }

    #[test]
    fn get_absent_key_returns_none() {
        let buf = CandleBuffer::new(10);
        assert_eq!(buf.get("BTCUSDT", Timeframe::M1, 60_000), None);

        // Same close time, different timeframe is a different key.
        buf.upsert(sample_candle("BTCUSDT", Timeframe::M1, 180_000, 1.0));
        assert_eq!(buf.get("BTCUSDT", Timeframe::M3, 180_000), None);
    }

    #[test]
    fn upsert_same_key_overwrites_entirely() {
        let buf = CandleBuffer::new(10);
        buf.upsert(sample_candle("ETHUSDT", Timeframe::M1, 60_000, 3_000.0));

        let mut replacement = sample_candle("ETHUSDT", Timeframe::M1, 60_000, 3_100.0);
        replacement.volume = 7.0;
        buf.upsert(replacement.clone());

        assert_eq!(buf.series_len("ETHUSDT", Timeframe::M1), 1);
        assert_eq!(buf.get("ETHUSDT", Timeframe::M1, 60_000), Some(replacement));
    }

    #[test]
    fn retention_evicts_oldest_first() {
        let buf = CandleBuffer::new(3);
        for i in 1..=5 {
            buf.upsert(sample_candle("BTCUSDT", Timeframe::M1, i * 60_000, i as f64));
        }

        assert_eq!(buf.series_len("BTCUSDT", Timeframe::M1), 3);
        assert_eq!(buf.get("BTCUSDT", Timeframe::M1, 60_000), None);
        assert_eq!(buf.get("BTCUSDT", Timeframe::M1, 120_000), None);
        assert!(buf.get("BTCUSDT", Timeframe::M1, 180_000).is_some());
        assert!(buf.get("BTCUSDT", Timeframe::M1, 300_000).is_some());
    }

    #[test]
    fn latest_returns_highest_close_time() {
        let buf = CandleBuffer::new(10);
        buf.upsert(sample_candle("BTCUSDT", Timeframe::M1, 120_000, 2.0));
        buf.upsert(sample_candle("BTCUSDT", Timeframe::M1, 60_000, 1.0));

        let latest = buf.latest("BTCUSDT", Timeframe::M1).unwrap();
        assert_eq!(latest.close_time, 120_000);
        assert_eq!(buf.latest("XRPUSDT", Timeframe::M1), None);
    }

    #[test]
    fn series_are_independent_per_symbol_and_timeframe() {
        let buf = CandleBuffer::new(10);
        buf.upsert(sample_candle("BTCUSDT", Timeframe::M1, 60_000, 1.0));
        buf.upsert(sample_candle("ETHUSDT", Timeframe::M1, 60_000, 2.0));
        buf.upsert(sample_candle("BTCUSDT", Timeframe::M3, 180_000, 3.0));

        assert_eq!(buf.series_len("BTCUSDT", Timeframe::M1), 1);
        assert_eq!(buf.series_len("ETHUSDT", Timeframe::M1), 1);
        assert_eq!(buf.series_len("BTCUSDT", Timeframe::M3), 1);
        assert_eq!(buf.total_len(), 3);
    }
}
