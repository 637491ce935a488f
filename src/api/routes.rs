// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// The request path the UI consumes: ticker search, the detail and analysis
// views (both cache-fronted), and watchlist/alert-rule CRUD against the
// registry store.
//
// Upstream failures are reported inside the payload (detail) or with the
// upstream's own status code (search, analysis) rather than a generic 500;
// registry failures map to 500 with a JSON error body.
//
// CORS is configured permissively for development.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::app_state::AppState;
use crate::error::{PersistenceError, UpstreamError};
use crate::store::RuleSpec;
use crate::types::{DailyBar, Market};

/// Detail view history span, in calendar days.
const DETAIL_HISTORY_DAYS: i64 = 365;

/// Default analysis span, in calendar days (2 years).
const DEFAULT_ANALYSIS_DAYS: i64 = 730;

/// Upper bound on the analysis span. Keeps the date arithmetic in range;
/// `NaiveDate` subtraction panics past its representable limits.
const MAX_ANALYSIS_DAYS: i64 = 36_500;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/search", get(search))
        .route("/api/detail", get(detail))
        .route("/api/analysis", get(analysis))
        .route(
            "/api/watchlist",
            get(watchlist_list)
                .post(watchlist_add)
                .delete(watchlist_remove),
        )
        .route("/api/alerts", get(alerts_get).post(alerts_set))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Error mapping
// =============================================================================

fn persistence_failure(e: PersistenceError) -> (StatusCode, Json<serde_json::Value>) {
    warn!(error = %e, "registry operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

fn upstream_failure(
    context: &str,
    e: &UpstreamError,
) -> (StatusCode, Json<serde_json::Value>) {
    warn!(error = %e, context, "upstream request failed");
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(json!({
            "error": "Polygon request failed",
            "status": status.as_u16(),
            "body": e.to_string(),
        })),
    )
}

/// A daily bar in the wire shape the UI chart expects: epoch-millisecond
/// timestamp `t` and close `c`.
fn bar_point(bar: &DailyBar) -> serde_json::Value {
    let ts_ms = bar
        .date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis());
    json!({ "t": ts_ms, "c": bar.close })
}

// =============================================================================
// Health
// =============================================================================

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

// =============================================================================
// Ticker search
// =============================================================================

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    market: Option<String>,
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let query = params.q.trim();
    if query.is_empty() {
        return Json(json!({ "results": [] })).into_response();
    }
    let market = Market::parse(params.market.as_deref().unwrap_or("stocks"));

    match state.market.search_tickers(query, market).await {
        Ok(matches) => Json(json!({ "results": matches })).into_response(),
        Err(e) => upstream_failure("search", &e).into_response(),
    }
}

// =============================================================================
// Detail view — snapshot price + 1-year history + yearly change
// =============================================================================

#[derive(Deserialize)]
struct DetailParams {
    ticker: Option<String>,
    #[serde(default)]
    market: Option<String>,
}

async fn detail(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DetailParams>,
) -> impl IntoResponse {
    let Some(ticker) = params.ticker.filter(|t| !t.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing ticker" })),
        )
            .into_response();
    };
    let market = Market::parse(params.market.as_deref().unwrap_or("stocks"));

    let to = Utc::now().date_naive();
    let from = to - chrono::Duration::days(DETAIL_HISTORY_DAYS);

    // Snapshot price, 30 s cache. Errors reported per-leg, never a 500.
    let snap_key = (market.as_str().to_string(), ticker.clone());
    let (snapshot, snapshot_err) = match state
        .caches
        .snapshot
        .get_or_compute(snap_key, || state.market.snapshot_price(&ticker, market))
        .await
    {
        Ok(fresh) => (Some(fresh), None),
        Err(e) => (None, Some(e.to_string())),
    };

    // Daily history, 15 min cache.
    let (bars, history_err) = match state
        .caches
        .history
        .get_or_compute((ticker.clone(), from, to), || {
            state.market.fetch_daily(&ticker, from, to)
        })
        .await
    {
        Ok(fresh) => (fresh, None),
        Err(e) => (Vec::new(), Some(e.to_string())),
    };

    let pct_change_1y = yearly_change(&bars);

    let response = json!({
        "price": snapshot.as_ref().and_then(|s| s.price),
        "timestamp": snapshot.as_ref().and_then(|s| s.timestamp),
        "price_source": snapshot.as_ref().map(|s| s.source),
        "history": bars.iter().map(bar_point).collect::<Vec<_>>(),
        "pct_change_1y": pct_change_1y,
        "errors": {
            "snapshot": snapshot_err,
            "history": history_err,
        },
    });
    Json(response).into_response()
}

/// Percent change from the first to the last close, when both exist and the
/// first is non-zero.
fn yearly_change(bars: &[DailyBar]) -> Option<f64> {
    if bars.len() < 2 {
        return None;
    }
    let first = bars.first()?.close;
    let last = bars.last()?.close;
    if first == 0.0 {
        return None;
    }
    Some((last - first) / first * 100.0)
}

// =============================================================================
// Analysis view — longer history plus a benchmark series
// =============================================================================

/// Benchmark preference: the S&P 500 index, falling back to the SPY ETF when
/// the index data is unavailable on the current plan.
const BENCHMARK_INDEX: &str = "I:SPX";
const BENCHMARK_ETF: &str = "SPY";

#[derive(Deserialize)]
struct AnalysisParams {
    ticker: Option<String>,
    #[serde(default)]
    market: Option<String>,
    #[serde(default)]
    days: Option<i64>,
}

async fn analysis(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalysisParams>,
) -> impl IntoResponse {
    let Some(ticker) = params.ticker.filter(|t| !t.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing ticker" })),
        )
            .into_response();
    };
    let market = Market::parse(params.market.as_deref().unwrap_or("stocks"));
    let days = params
        .days
        .unwrap_or(DEFAULT_ANALYSIS_DAYS)
        .clamp(1, MAX_ANALYSIS_DAYS);

    let result = state
        .caches
        .analysis
        .get_or_compute((ticker.clone(), days), || async {
            let to = Utc::now().date_naive();
            let from = to - chrono::Duration::days(days);
            let series = state.market.fetch_daily(&ticker, from, to).await?;

            // Benchmark is best-effort: a failed or empty fetch just omits it.
            let (benchmark, benchmark_ticker) = if ticker == BENCHMARK_INDEX {
                (Vec::new(), None)
            } else {
                match state.market.fetch_daily(BENCHMARK_INDEX, from, to).await {
                    Ok(bars) if !bars.is_empty() => (bars, Some(BENCHMARK_INDEX)),
                    _ => match state.market.fetch_daily(BENCHMARK_ETF, from, to).await {
                        Ok(bars) if !bars.is_empty() => (bars, Some(BENCHMARK_ETF)),
                        _ => (Vec::new(), None),
                    },
                }
            };

            Ok::<_, UpstreamError>(json!({
                "series": series.iter().map(bar_point).collect::<Vec<_>>(),
                "benchmark": benchmark.iter().map(bar_point).collect::<Vec<_>>(),
                "benchmark_ticker": benchmark_ticker,
                "ticker": ticker.as_str(),
                "market": market.as_str(),
                "days": days,
            }))
        })
        .await;

    match result {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => upstream_failure("analysis", &e).into_response(),
    }
}

// =============================================================================
// Watchlist CRUD
// =============================================================================

async fn watchlist_list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.list_watchlist() {
        Ok(items) => Json(json!({ "items": items })).into_response(),
        Err(e) => persistence_failure(e).into_response(),
    }
}

#[derive(Deserialize)]
struct WatchlistAdd {
    ticker: String,
    #[serde(default)]
    market: Option<String>,
    #[serde(default)]
    name: String,
}

async fn watchlist_add(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WatchlistAdd>,
) -> impl IntoResponse {
    let market = Market::parse(req.market.as_deref().unwrap_or("stocks"));
    match state
        .store
        .add_watchlist_item(&req.ticker, market, &req.name)
    {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => persistence_failure(e).into_response(),
    }
}

#[derive(Deserialize)]
struct WatchlistRemove {
    ticker: String,
    #[serde(default)]
    market: Option<String>,
}

async fn watchlist_remove(
    State(state): State<Arc<AppState>>,
    Query(req): Query<WatchlistRemove>,
) -> impl IntoResponse {
    let market = Market::parse(req.market.as_deref().unwrap_or("stocks"));
    match state.store.remove_watchlist_item(&req.ticker, market) {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => persistence_failure(e).into_response(),
    }
}

// =============================================================================
// Alert rules
// =============================================================================

#[derive(Deserialize)]
struct AlertsQuery {
    ticker: String,
}

async fn alerts_get(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertsQuery>,
) -> impl IntoResponse {
    match state.store.rules_for(&params.ticker) {
        Ok(rules) => Json(json!({ "rules": rules })).into_response(),
        Err(e) => persistence_failure(e).into_response(),
    }
}

#[derive(Deserialize)]
struct AlertsSet {
    ticker: String,
    #[serde(default)]
    market: Option<String>,
    #[serde(default)]
    rules: Vec<RuleSpec>,
}

async fn alerts_set(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AlertsSet>,
) -> impl IntoResponse {
    let market = Market::parse(req.market.as_deref().unwrap_or("stocks"));
    match state.store.replace_rules(&req.ticker, market, &req.rules) {
        Ok(()) => Json(json!({ "ok": true, "count": req.rules.len() })).into_response(),
        Err(e) => persistence_failure(e).into_response(),
    }
}
