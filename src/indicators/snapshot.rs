// =============================================================================
// Indicator snapshot — everything the rule evaluator needs for one symbol
// =============================================================================
//
// Recomputed fresh on every evaluation pass and never persisted. A snapshot
// only exists when the series carries enough history for the MA200 and
// 52-week comparisons to mean anything; callers skip the symbol otherwise.
// =============================================================================

use super::extrema::{trailing_extremum, Extremum};
use super::sma::moving_average;

/// Moving-average window for the MA200 rule.
pub const MA_WINDOW: usize = 200;
/// Trailing window for the 52-week high/low, in calendar entries.
pub const EXTREMUM_WINDOW: usize = 365;
/// Minimum number of daily bars before a symbol is evaluated at all.
pub const MIN_HISTORY_BARS: usize = 250;

/// Derived per-symbol state for one evaluation pass.
#[derive(Debug, Clone)]
pub struct IndicatorSnapshot {
    pub current_close: f64,
    pub prev_close: Option<f64>,
    pub trailing_52w_high: f64,
    pub trailing_52w_low: f64,
    /// Index-aligned with the closing series; first `MA_WINDOW - 1` entries
    /// are `None`.
    pub ma200: Vec<Option<f64>>,
}

impl IndicatorSnapshot {
    /// Build a snapshot from an ascending closing-price series.
    ///
    /// Returns `None` when the series is shorter than [`MIN_HISTORY_BARS`]
    /// or the latest close is not a finite number.
    pub fn build(closes: &[f64]) -> Option<Self> {
        if closes.len() < MIN_HISTORY_BARS {
            return None;
        }

        let current_close = *closes.last()?;
        if !current_close.is_finite() {
            return None;
        }

        let trailing_52w_high = trailing_extremum(closes, EXTREMUM_WINDOW, Extremum::Max)?;
        let trailing_52w_low = trailing_extremum(closes, EXTREMUM_WINDOW, Extremum::Min)?;

        Some(Self {
            current_close,
            prev_close: closes.len().checked_sub(2).map(|i| closes[i]),
            trailing_52w_high,
            trailing_52w_low,
            ma200: moving_average(closes, MA_WINDOW),
        })
    }

    /// MA200 at the latest bar, if defined.
    pub fn ma200_current(&self) -> Option<f64> {
        self.ma200.last().copied().flatten()
    }

    /// MA200 at the previous bar, if defined.
    pub fn ma200_prev(&self) -> Option<f64> {
        let len = self.ma200.len();
        len.checked_sub(2).and_then(|i| self.ma200[i])
    }
}
