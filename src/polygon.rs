// =============================================================================
// Polygon.io REST client
// =============================================================================
//
// Free-tier friendly access: previous-close aggregates for stocks and
// indices, the last FX quote for currency pairs, daily aggregate ranges for
// history, and reference-ticker search. The API key travels as an `apiKey`
// query parameter on every request.
//
// Non-2xx responses surface the upstream status code and body text as an
// [`UpstreamError::Status`] so callers can report what Polygon actually said.
// A single request must cover the whole date range; the 50 000-row limit is
// far beyond any range this service asks for, so no pagination handling.
// =============================================================================

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::UpstreamError;
use crate::types::{DailyBar, Market};

/// Per-request timeout, matching the original client.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Aggregate-range row cap; Polygon's maximum.
const RANGE_LIMIT: &str = "50000";

/// Fingerprint of a daily-history request, used as the cache key.
pub type HistoryKey = (String, NaiveDate, NaiveDate);

/// A price observation for the detail view.
#[derive(Debug, Clone, Serialize)]
pub struct PriceSnapshot {
    pub price: Option<f64>,
    pub timestamp: Option<i64>,
    pub source: &'static str,
}

impl PriceSnapshot {
    fn none() -> Self {
        Self {
            price: None,
            timestamp: None,
            source: "none",
        }
    }
}

/// One ticker-search match.
#[derive(Debug, Clone, Serialize)]
pub struct TickerMatch {
    pub ticker: Option<String>,
    pub name: Option<String>,
    pub market: Option<String>,
}

/// Polygon REST client.
#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl PolygonClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("failed to build reqwest client");

        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            client,
        }
    }

    // -------------------------------------------------------------------------
    // Request plumbing
    // -------------------------------------------------------------------------

    /// Build the full request URL with the API key and encoded parameters.
    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<String, UpstreamError> {
        if self.api_key.is_empty() {
            return Err(UpstreamError::MissingApiKey);
        }

        let mut query = format!("apiKey={}", urlencoding::encode(&self.api_key));
        for (key, value) in params {
            query.push('&');
            query.push_str(key);
            query.push('=');
            query.push_str(&urlencoding::encode(value));
        }
        Ok(format!("{}{}?{}", self.base_url, path, query))
    }

    /// GET `path` and parse the JSON body, surfacing non-2xx as status+body.
    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, UpstreamError> {
        let url = self.url(path, params)?;
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = resp.json().await?;
        Ok(body)
    }

    // -------------------------------------------------------------------------
    // Daily history
    // -------------------------------------------------------------------------

    /// Fetch split/dividend-adjusted daily bars for `[from, to]`, ascending
    /// by date.
    pub async fn fetch_daily(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyBar>, UpstreamError> {
        let path = format!("/v2/aggs/ticker/{ticker}/range/1/day/{from}/{to}");
        let body = self
            .get_json(
                &path,
                &[
                    ("adjusted", "true"),
                    ("sort", "asc"),
                    ("limit", RANGE_LIMIT),
                ],
            )
            .await?;

        let bars = parse_daily_bars(&body);
        debug!(ticker, %from, %to, count = bars.len(), "daily history fetched");
        Ok(bars)
    }

    // -------------------------------------------------------------------------
    // Snapshot price
    // -------------------------------------------------------------------------

    /// Latest price, free-tier friendly: previous close for stocks and
    /// indices, last-quote mid for FX. Symbols with no data yield a snapshot
    /// with `price: None` rather than an error.
    pub async fn snapshot_price(
        &self,
        ticker: &str,
        market: Market,
    ) -> Result<PriceSnapshot, UpstreamError> {
        if market.is_fx() {
            let Some((base, quote)) = parse_fx_pair(ticker) else {
                warn!(ticker, "cannot split FX ticker into a currency pair");
                return Ok(PriceSnapshot::none());
            };

            let path = format!("/v1/last_quote/currencies/{base}/{quote}");
            let body = self.get_json(&path, &[]).await?;
            let last = &body["last"];
            let bid = last["bid"].as_f64();
            let ask = last["ask"].as_f64();

            return Ok(PriceSnapshot {
                price: fx_mid(bid, ask),
                timestamp: last["timestamp"].as_i64(),
                source: "fx_last_quote",
            });
        }

        let path = format!("/v2/aggs/ticker/{ticker}/prev");
        let body = self.get_json(&path, &[("adjusted", "true")]).await?;

        match body["results"].as_array().and_then(|arr| arr.first()) {
            Some(row) => Ok(PriceSnapshot {
                price: row["c"].as_f64(),
                timestamp: row["t"].as_i64(),
                source: "prev_close",
            }),
            None => Ok(PriceSnapshot::none()),
        }
    }

    // -------------------------------------------------------------------------
    // Ticker search
    // -------------------------------------------------------------------------

    /// Search active reference tickers within one market segment.
    pub async fn search_tickers(
        &self,
        query: &str,
        market: Market,
    ) -> Result<Vec<TickerMatch>, UpstreamError> {
        let body = self
            .get_json(
                "/v3/reference/tickers",
                &[
                    ("search", query),
                    ("active", "true"),
                    ("limit", "20"),
                    ("market", market.as_str()),
                ],
            )
            .await?;

        let matches = body["results"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|it| TickerMatch {
                        ticker: it["ticker"].as_str().map(str::to_string),
                        name: it["name"].as_str().map(str::to_string),
                        market: it["market"].as_str().map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(matches)
    }
}

impl std::fmt::Debug for PolygonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolygonClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Payload parsing helpers
// -----------------------------------------------------------------------------

/// Extract daily bars from an aggregates payload. Rows missing the timestamp
/// or close are skipped rather than failing the whole series; a payload with
/// no `results` array yields an empty series.
pub fn parse_daily_bars(body: &serde_json::Value) -> Vec<DailyBar> {
    let Some(rows) = body["results"].as_array() else {
        return Vec::new();
    };

    let mut bars = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(ts_ms), Some(close)) = (row["t"].as_i64(), row["c"].as_f64()) else {
            warn!("skipping malformed aggregate row: {row}");
            continue;
        };
        let Some(date) = DateTime::from_timestamp_millis(ts_ms).map(|dt| dt.date_naive()) else {
            warn!(ts_ms, "skipping aggregate row with out-of-range timestamp");
            continue;
        };
        bars.push(DailyBar { date, close });
    }
    bars
}

/// Split an FX ticker like `C:EURUSD` into `(base, quote)`. Returns `None`
/// when the symbol part is too short to carry a 3-letter quote currency.
pub fn parse_fx_pair(ticker: &str) -> Option<(String, String)> {
    let sym = match ticker.split_once(':') {
        Some((_, rest)) => rest,
        None => ticker,
    };
    if sym.len() < 6 {
        return None;
    }
    let split = sym.len() - 3;
    Some((sym[..split].to_string(), sym[split..].to_string()))
}

/// Mid price from a bid/ask pair, falling back to whichever side exists.
fn fx_mid(bid: Option<f64>, ask: Option<f64>) -> Option<f64> {
    match (bid, ask) {
        (Some(b), Some(a)) => Some((b + a) / 2.0),
        (Some(b), None) => Some(b),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    }
}
