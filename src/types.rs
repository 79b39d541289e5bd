// =============================================================================
// Shared types used across the Tickfold candle engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Fixed set of aggregation windows the engine understands.
///
/// Serialises to and from the short exchange-style form ("1m", "3m", ...),
/// which is also the form used inside signal idempotency keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "10m")]
    M10,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
}

impl Default for Timeframe {
    fn default() -> Self {
        Self::M1
    }
}

/// All supported timeframes ordered by precedence, longest window first.
pub const PRECEDENCE: [Timeframe; 7] = [
    Timeframe::H4,
    Timeframe::H1,
    Timeframe::M15,
    Timeframe::M10,
    Timeframe::M5,
    Timeframe::M3,
    Timeframe::M1,
];

impl Timeframe {
    /// Window length in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        match self {
            Self::M1 => 60_000,
            Self::M3 => 180_000,
            Self::M5 => 300_000,
            Self::M10 => 600_000,
            Self::M15 => 900_000,
            Self::H1 => 3_600_000,
            Self::H4 => 14_400_000,
        }
    }

    /// The lower timeframe this one is resampled from, with the N:1 ratio.
    ///
    /// Every derived timeframe has exactly one canonical source whose
    /// duration divides its own. `1m` is the base and returns `None`.
    pub fn constituent(&self) -> Option<(Timeframe, usize)> {
        match self {
            Self::M1 => None,
            Self::M3 => Some((Self::M1, 3)),
            Self::M5 => Some((Self::M1, 5)),
            Self::M10 => Some((Self::M5, 2)),
            Self::M15 => Some((Self::M5, 3)),
            Self::H1 => Some((Self::M15, 4)),
            Self::H4 => Some((Self::H1, 4)),
        }
    }

    /// Short exchange-style name ("1m", "3m", ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M10 => "10m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
        }
    }

    /// Parse from the short form. Returns `None` for anything outside the
    /// supported set.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "1m" => Some(Self::M1),
            "3m" => Some(Self::M3),
            "5m" => Some(Self::M5),
            "10m" => Some(Self::M10),
            "15m" => Some(Self::M15),
            "1h" => Some(Self::H1),
            "4h" => Some(Self::H4),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
