// =============================================================================
// Simple Moving Average (SMA) — streaming windowed mean
// =============================================================================
//
// Output is index-aligned with the input: element `i` is `None` while the
// window has not yet filled (`i + 1 < window`), and otherwise the arithmetic
// mean of the `window` closes ending at `i` inclusive.
//
// The window is maintained as a running sum plus a sliding queue of the last
// `window` values, so each step is O(1) amortised rather than O(window).
// =============================================================================

use std::collections::VecDeque;

/// Compute the windowed moving-average series for `closes`.
///
/// # Edge cases
/// - `window == 0` => all `None` (a zero-length mean is undefined)
/// - input shorter than `window` => all `None`
pub fn moving_average(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; closes.len()];
    }

    let mut out = Vec::with_capacity(closes.len());
    let mut queue: VecDeque<f64> = VecDeque::with_capacity(window + 1);
    let mut running_sum = 0.0;

    for &close in closes {
        queue.push_back(close);
        running_sum += close;
        if queue.len() > window {
            if let Some(oldest) = queue.pop_front() {
                running_sum -= oldest;
            }
        }

        if queue.len() == window {
            out.push(Some(running_sum / window as f64));
        } else {
            out.push(None);
        }
    }

    out
}
