// =============================================================================
// Trailing extrema — max/min over the most recent N observations
// =============================================================================

/// Which end of the range to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Max,
    Min,
}

/// Extremum of the last `window` elements of `closes` (fewer if the series is
/// shorter). Returns `None` for an empty series or a zero window.
///
/// The 52-week high/low uses `window = 365` calendar entries as a proxy for
/// 52 weeks of trading days; an approximation inherited from the original
/// service, not a strict trading-day count.
pub fn trailing_extremum(closes: &[f64], window: usize, kind: Extremum) -> Option<f64> {
    if closes.is_empty() || window == 0 {
        return None;
    }

    let start = closes.len().saturating_sub(window);
    let tail = &closes[start..];

    let folded = match kind {
        Extremum::Max => tail.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        Extremum::Min => tail.iter().cloned().fold(f64::INFINITY, f64::min),
    };

    folded.is_finite().then_some(folded)
}
