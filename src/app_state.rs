// =============================================================================
// Central application state
// =============================================================================
//
// Shared by the API handlers and the alert worker via `Arc`. The caches are
// one instance per TTL class, constructed from the injected configuration;
// nothing here is ambient or static, so tests build isolated states freely.
// =============================================================================

use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::config::{CacheTtls, Config};
use crate::polygon::{HistoryKey, PolygonClient, PriceSnapshot};
use crate::store::Store;
use crate::types::DailyBar;

/// The three response-cache classes.
pub struct Caches {
    /// Live/previous-close price reads, keyed `(market, ticker)`.
    pub snapshot: Arc<ResponseCache<(String, String), PriceSnapshot>>,
    /// Daily-bar history reads, keyed `(ticker, from, to)`. Distinct date
    /// ranges are distinct entries; no range merging.
    pub history: Arc<ResponseCache<HistoryKey, Vec<DailyBar>>>,
    /// Assembled analysis payloads, keyed `(ticker, days)`.
    pub analysis: Arc<ResponseCache<(String, i64), serde_json::Value>>,
}

impl Caches {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            snapshot: Arc::new(ResponseCache::new(ttls.snapshot)),
            history: Arc::new(ResponseCache::new(ttls.history)),
            analysis: Arc::new(ResponseCache::new(ttls.analysis)),
        }
    }
}

/// Everything the request path needs, behind one `Arc`.
pub struct AppState {
    pub config: Config,
    pub store: Arc<Store>,
    pub market: Arc<PolygonClient>,
    pub caches: Caches,
}

impl AppState {
    pub fn new(config: Config, store: Arc<Store>, market: Arc<PolygonClient>) -> Self {
        let caches = Caches::new(config.cache);
        Self {
            config,
            store,
            market,
            caches,
        }
    }
}
