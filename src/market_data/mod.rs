pub mod candle_buffer;
pub mod price_source;
pub mod resample;

// Re-export the core data types for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle_buffer::{Candle, CandleBuffer, SeriesKey};
pub use price_source::{FlatPriceSource, PriceSource};
