// =============================================================================
// Shared types used across the MarketSentry backend
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Market segment a ticker belongs to. Polygon uses `fx` in search results
/// but the UI historically sent `forex` as well; both deserialise to [`Fx`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Stocks,
    Indices,
    Fx,
    #[serde(rename = "forex")]
    Forex,
}

impl Market {
    /// Parse the strings the store and the UI use. Unknown values fall back
    /// to `stocks`, matching the original service's permissive handling.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "indices" => Self::Indices,
            "fx" => Self::Fx,
            "forex" => Self::Forex,
            _ => Self::Stocks,
        }
    }

    /// `fx` and `forex` are the same segment under two historical names.
    pub fn is_fx(self) -> bool {
        matches!(self, Self::Fx | Self::Forex)
    }

    /// Segment equality: treats the two FX spellings as one market.
    pub fn same_segment(self, other: Market) -> bool {
        self == other || (self.is_fx() && other.is_fx())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stocks => "stocks",
            Self::Indices => "indices",
            Self::Fx => "fx",
            Self::Forex => "forex",
        }
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tradable instrument: identity is the `(ticker, market)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub ticker: String,
    pub market: Market,
}

impl Symbol {
    pub fn new(ticker: impl Into<String>, market: Market) -> Self {
        Self {
            ticker: ticker.into(),
            market,
        }
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.ticker, self.market)
    }
}

/// One trading day's observation. Series are ascending by date with no
/// duplicate dates per symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub close: f64,
}

/// A persisted alert rule. `rule_type` is kept as the raw stored string so
/// that rows written by a newer version with kinds we do not recognise
/// round-trip unchanged; parsing happens at evaluation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub ticker: String,
    pub market: Market,
    pub rule_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Rule {
    /// Numeric parameter lookup; accepts both JSON numbers and numeric
    /// strings since the UI has sent both over time.
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        let v = self.params.get(key)?;
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    }
}

/// A watchlist row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistItem {
    pub ticker: String,
    pub market: Market,
    #[serde(default)]
    pub name: String,
}
