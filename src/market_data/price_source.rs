// =============================================================================
// Price Source — upstream collaborator for base-timeframe closes
// =============================================================================
//
// The scheduler asks a `PriceSource` for the candle covering the window that
// just closed. A real exchange integration implements this trait; the engine
// ships with `FlatPriceSource`, a stand-in that fabricates a flat zero-volume
// candle so the pipeline can run end to end without network access.

use anyhow::Result;

use crate::market_data::Candle;
use crate::types::Timeframe;

/// Provides OHLCV data for a symbol's window ending at `close_time_ms`.
pub trait PriceSource: Send + Sync {
    fn fetch_close(&self, symbol: &str, timeframe: Timeframe, close_time_ms: i64)
        -> Result<Candle>;
}

/// Placeholder source: every fetch yields a flat candle at `base_price` with
/// zero volume.
pub struct FlatPriceSource {
    base_price: f64,
}

impl FlatPriceSource {
    pub fn new(base_price: f64) -> Self {
        Self { base_price }
    }
}

impl PriceSource for FlatPriceSource {
    fn fetch_close(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        close_time_ms: i64,
    ) -> Result<Candle> {
        Ok(Candle {
            symbol: symbol.to_string(),
            timeframe,
            open_time: close_time_ms - timeframe.duration_ms(),
            close_time: close_time_ms,
            open: self.base_price,
            high: self.base_price,
            low: self.base_price,
            close: self.base_price,
            volume: 0.0,
        })
    }
}
