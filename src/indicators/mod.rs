// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free computations over closing-price sequences. Every
// public function returns `Option`/`Vec<Option<_>>` so callers are forced to
// handle insufficient-data and numerical-edge-case scenarios.

pub mod extrema;
pub mod sma;
pub mod snapshot;
