// =============================================================================
// Runtime Configuration — engine settings with atomic save
// =============================================================================
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::Timeframe;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn default_timeframes() -> Vec<Timeframe> {
    vec![Timeframe::M1, Timeframe::M3]
}

fn default_base_timeframe() -> Timeframe {
    Timeframe::M1
}

fn default_max_candles_per_series() -> usize {
    500
}

fn default_signal_queue_capacity() -> usize {
    256
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the candle engine.
///
/// Every field has a serde default so that older JSON files missing new
/// fields still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Symbols the engine tracks and emits signals for.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Timeframes with an active boundary schedule. Derived timeframes are
    /// resampled from their constituent series.
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,

    /// The timeframe whose closes are fetched from the upstream price source
    /// rather than resampled.
    #[serde(default = "default_base_timeframe")]
    pub base_timeframe: Timeframe,

    /// Retention cap per (symbol, timeframe) series; oldest candles are
    /// evicted first.
    #[serde(default = "default_max_candles_per_series")]
    pub max_candles_per_series: usize,

    /// Dedup window for repeated idempotency keys, in seconds. `None` means
    /// one timeframe duration per key.
    #[serde(default)]
    pub dedup_window_secs: Option<u64>,

    /// Base price the placeholder upstream source fabricates candles at.
    #[serde(default)]
    pub flat_price: f64,

    /// Bounded capacity of the in-process signal channel.
    #[serde(default = "default_signal_queue_capacity")]
    pub signal_queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            timeframes: default_timeframes(),
            base_timeframe: default_base_timeframe(),
            max_candles_per_series: default_max_candles_per_series(),
            dedup_window_secs: None,
            flat_price: 0.0,
            signal_queue_capacity: default_signal_queue_capacity(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            timeframes = ?config.timeframes,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Ensure the base timeframe is part of the schedule. Returns `true` if
    /// it had to be inserted.
    pub fn ensure_base_scheduled(&mut self) -> bool {
        if self.timeframes.contains(&self.base_timeframe) {
            return false;
        }
        self.timeframes.push(self.base_timeframe);
        true
    }

    /// Derived timeframes whose constituent source series is not tracked.
    /// Such timeframes never find their constituents in the buffer and every
    /// cycle for them is skipped.
    pub fn untracked_sources(&self) -> Vec<(Timeframe, Timeframe)> {
        self.timeframes
            .iter()
            .filter_map(|tf| tf.constituent().map(|(source, _)| (*tf, source)))
            .filter(|(_, source)| !self.timeframes.contains(source))
            .collect()
    }
}
