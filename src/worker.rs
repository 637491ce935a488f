// =============================================================================
// Alert worker — the recurring evaluation loop
// =============================================================================
//
// One long-lived task: sleep until the next tick, take the deduplicated set
// of symbols with at least one active rule, fetch ~400 calendar days of daily
// bars per symbol, derive the indicator snapshot, evaluate every rule for the
// symbol, and hand triggered alerts to the notification sink.
//
// Failure containment, in order of blast radius:
//   - one rule's notification failing is logged and the remaining rules for
//     the symbol still run;
//   - one symbol failing (fetch or registry read) is logged and the pass
//     continues with the next symbol;
//   - a whole pass failing is logged and the worker sleeps until the next
//     tick. The loop never terminates short of process shutdown.
//
// Rule evaluation is stateless across ticks: a condition that remains true
// will fire again on every pass. Inherited behavior, kept on purpose.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::config::WorkerConfig;
use crate::indicators::snapshot::{IndicatorSnapshot, MIN_HISTORY_BARS};
use crate::notify::NotificationSink;
use crate::polygon::{HistoryKey, PolygonClient};
use crate::rules::{self, AlertEvent};
use crate::store::Store;
use crate::types::{DailyBar, Rule, Symbol};

/// Calendar days of history requested per symbol; comfortably above the
/// 250-bar minimum and the 365-entry extremum window even across holidays.
const FETCH_WINDOW_DAYS: i64 = 400;

/// Pause between symbols within a pass. Rate-limit politeness toward the
/// upstream, not a correctness requirement.
const SYMBOL_PAUSE: Duration = Duration::from_secs(1);

/// Why a symbol produced no rule evaluations this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer daily bars than [`MIN_HISTORY_BARS`].
    InsufficientHistory { got: usize },
    /// The series could not produce an indicator snapshot.
    NoSnapshot,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientHistory { got } => {
                write!(f, "insufficient history ({got} bars, need {MIN_HISTORY_BARS})")
            }
            Self::NoSnapshot => write!(f, "no indicator snapshot"),
        }
    }
}

/// Result of evaluating one symbol's rules against its fetched history.
#[derive(Debug)]
pub enum SymbolEvaluation {
    Skipped(SkipReason),
    Fired(Vec<AlertEvent>),
}

/// Counters for one pass, logged at completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassStats {
    pub symbols: usize,
    pub evaluated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub fired: usize,
}

/// Evaluate all of a symbol's rules against its daily-bar series.
///
/// Pure with respect to I/O: the worker calls this with whatever history it
/// fetched, and tests call it with synthetic series.
pub fn evaluate_symbol(symbol_rules: &[Rule], bars: &[DailyBar]) -> SymbolEvaluation {
    if bars.len() < MIN_HISTORY_BARS {
        return SymbolEvaluation::Skipped(SkipReason::InsufficientHistory { got: bars.len() });
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let Some(snap) = IndicatorSnapshot::build(&closes) else {
        return SymbolEvaluation::Skipped(SkipReason::NoSnapshot);
    };

    let events = symbol_rules
        .iter()
        .filter_map(|rule| rules::evaluate(rule, &snap))
        .collect();
    SymbolEvaluation::Fired(events)
}

/// The background evaluation loop. Dependencies arrive at construction; the
/// worker shares the history cache with the request path.
pub struct AlertWorker {
    store: Arc<Store>,
    market: Arc<PolygonClient>,
    history_cache: Arc<ResponseCache<HistoryKey, Vec<DailyBar>>>,
    sink: Arc<dyn NotificationSink>,
    interval: Duration,
    destination: Option<String>,
}

impl AlertWorker {
    pub fn new(
        store: Arc<Store>,
        market: Arc<PolygonClient>,
        history_cache: Arc<ResponseCache<HistoryKey, Vec<DailyBar>>>,
        sink: Arc<dyn NotificationSink>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            market,
            history_cache,
            sink,
            interval: config.interval,
            destination: config.destination.clone(),
        }
    }

    /// Run forever. Each tick attempts a full pass; any pass-level failure is
    /// logged and retried on the next tick.
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "alert worker starting");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.run_pass().await {
                Ok(stats) => info!(
                    symbols = stats.symbols,
                    evaluated = stats.evaluated,
                    skipped = stats.skipped,
                    failed = stats.failed,
                    fired = stats.fired,
                    "alert pass complete"
                ),
                Err(e) => warn!(error = %e, "alert pass failed; retrying on next tick"),
            }
        }
    }

    /// One evaluation pass over the deduplicated active-rule symbol set.
    pub async fn run_pass(&self) -> anyhow::Result<PassStats> {
        let symbols = self.store.active_rule_symbols()?;
        let mut stats = PassStats {
            symbols: symbols.len(),
            ..PassStats::default()
        };

        for (i, symbol) in symbols.iter().enumerate() {
            match self.process_symbol(symbol).await {
                Ok(SymbolEvaluation::Skipped(reason)) => {
                    debug!(symbol = %symbol, %reason, "symbol skipped this cycle");
                    stats.skipped += 1;
                }
                Ok(SymbolEvaluation::Fired(events)) => {
                    stats.evaluated += 1;
                    stats.fired += events.len();
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "symbol failed; continuing pass");
                    stats.failed += 1;
                }
            }

            if i + 1 < symbols.len() {
                tokio::time::sleep(SYMBOL_PAUSE).await;
            }
        }

        Ok(stats)
    }

    /// Fetch, evaluate, and notify for a single symbol.
    async fn process_symbol(&self, symbol: &Symbol) -> anyhow::Result<SymbolEvaluation> {
        let to = Utc::now().date_naive();
        let from = to - chrono::Duration::days(FETCH_WINDOW_DAYS);

        let key: HistoryKey = (symbol.ticker.clone(), from, to);
        let bars = self
            .history_cache
            .get_or_compute(key, || self.market.fetch_daily(&symbol.ticker, from, to))
            .await?;

        let symbol_rules: Vec<Rule> = self
            .store
            .rules_for(&symbol.ticker)?
            .into_iter()
            .filter(|r| r.market.same_segment(symbol.market))
            .collect();

        let evaluation = evaluate_symbol(&symbol_rules, &bars);

        if let SymbolEvaluation::Fired(events) = &evaluation {
            for event in events {
                let outcome =
                    self.sink
                        .send(&event.subject, &event.body, self.destination.as_deref());
                if outcome.delivered {
                    info!(symbol = %symbol, rule = %event.rule_type, "alert fired and delivered");
                } else {
                    warn!(
                        symbol = %symbol,
                        rule = %event.rule_type,
                        detail = %outcome.detail,
                        "alert fired but delivery failed"
                    );
                }
            }
        }

        Ok(evaluation)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::notify::Delivery;
    use crate::types::Market;
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Daily bars with sequential dates and the given closes.
    fn bars_from_closes(closes: &[f64]) -> Vec<DailyBar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| DailyBar {
                date: start + chrono::Duration::days(i as i64),
                close,
            })
            .collect()
    }

    fn rule(ticker: &str, rule_type: &str, params: serde_json::Value, active: bool) -> Rule {
        Rule {
            ticker: ticker.into(),
            market: Market::Stocks,
            rule_type: rule_type.into(),
            params,
            active,
        }
    }

    // ---- evaluate_symbol -------------------------------------------------

    #[test]
    fn short_history_skips_the_symbol() {
        let rules = vec![rule("AAPL", "pct_drop_day", json!({}), true)];
        let bars = bars_from_closes(&vec![100.0; 100]);
        match evaluate_symbol(&rules, &bars) {
            SymbolEvaluation::Skipped(SkipReason::InsufficientHistory { got }) => {
                assert_eq!(got, 100)
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn six_percent_drop_fires_a_five_percent_rule() {
        let rules = vec![rule("AAPL", "pct_drop_day", json!({ "percent": 5.0 }), true)];
        let mut closes = vec![100.0; 260];
        closes[259] = 94.0;
        let bars = bars_from_closes(&closes);

        match evaluate_symbol(&rules, &bars) {
            SymbolEvaluation::Fired(events) => {
                assert_eq!(events.len(), 1);
                assert!(events[0].body.contains("6.00"), "body: {}", events[0].body);
            }
            other => panic!("expected fire, got {other:?}"),
        }
    }

    #[test]
    fn four_percent_drop_does_not_fire_a_five_percent_rule() {
        let rules = vec![rule("AAPL", "pct_drop_day", json!({ "percent": 5.0 }), true)];
        let mut closes = vec![100.0; 260];
        closes[259] = 96.0;
        let bars = bars_from_closes(&closes);

        match evaluate_symbol(&rules, &bars) {
            SymbolEvaluation::Fired(events) => assert!(events.is_empty()),
            other => panic!("expected empty evaluation, got {other:?}"),
        }
    }

    #[test]
    fn strictly_increasing_series_fires_new_high() {
        let rules = vec![rule("NVDA", "new_52w_high", json!({}), true)];
        let closes: Vec<f64> = (1..=400).map(|i| i as f64).collect();
        let bars = bars_from_closes(&closes);

        match evaluate_symbol(&rules, &bars) {
            SymbolEvaluation::Fired(events) => assert_eq!(events.len(), 1),
            other => panic!("expected fire, got {other:?}"),
        }
    }

    #[test]
    fn inactive_and_unknown_rules_produce_no_events() {
        let rules = vec![
            rule("AAPL", "new_52w_high", json!({}), false),
            rule("AAPL", "bollinger_squeeze", json!({}), true),
        ];
        let closes: Vec<f64> = (1..=400).map(|i| i as f64).collect();
        let bars = bars_from_closes(&closes);

        match evaluate_symbol(&rules, &bars) {
            SymbolEvaluation::Fired(events) => assert!(events.is_empty()),
            other => panic!("expected empty evaluation, got {other:?}"),
        }
    }

    // ---- run_pass orchestration ------------------------------------------

    struct RecordingSink {
        sent: Mutex<Vec<(String, String, Option<String>)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl NotificationSink for RecordingSink {
        fn send(&self, subject: &str, body: &str, destination: Option<&str>) -> Delivery {
            self.sent.lock().push((
                subject.to_string(),
                body.to_string(),
                destination.map(str::to_string),
            ));
            Delivery {
                delivered: true,
                detail: "recorded".to_string(),
            }
        }
    }

    /// Seed the history cache with exactly the key the worker will compute,
    /// so the pass never reaches the network.
    fn seed_history(
        cache: &ResponseCache<HistoryKey, Vec<DailyBar>>,
        ticker: &str,
        closes: &[f64],
    ) {
        let to = Utc::now().date_naive();
        let from = to - chrono::Duration::days(FETCH_WINDOW_DAYS);
        cache.store((ticker.to_string(), from, to), bars_from_closes(closes));
    }

    fn worker_with(
        store: Arc<Store>,
        cache: Arc<ResponseCache<HistoryKey, Vec<DailyBar>>>,
        sink: Arc<RecordingSink>,
    ) -> AlertWorker {
        let config = WorkerConfig {
            enabled: true,
            interval: Duration::from_secs(900),
            destination: Some("ops@example.com".into()),
        };
        AlertWorker::new(
            store,
            Arc::new(PolygonClient::new("test-key", "http://127.0.0.1:9")),
            cache,
            sink,
            &config,
        )
    }

    #[tokio::test]
    async fn pass_fires_and_delivers_for_a_triggered_rule() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store
            .replace_rules(
                "AAPL",
                Market::Stocks,
                &[crate::store::RuleSpec {
                    rule_type: "pct_drop_day".into(),
                    params: json!({ "percent": 5.0 }),
                    active: true,
                }],
            )
            .unwrap();

        let cache = Arc::new(ResponseCache::new(Duration::from_secs(900)));
        let mut closes = vec![100.0; 260];
        closes[259] = 94.0;
        seed_history(&cache, "AAPL", &closes);

        let sink = Arc::new(RecordingSink::new());
        let worker = worker_with(store, cache, sink.clone());

        let stats = worker.run_pass().await.unwrap();
        assert_eq!(stats.symbols, 1);
        assert_eq!(stats.evaluated, 1);
        assert_eq!(stats.fired, 1);

        let sent = sink.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("AAPL"));
        assert_eq!(sent[0].2.as_deref(), Some("ops@example.com"));
    }

    #[tokio::test]
    async fn pass_skips_symbol_with_only_100_bars() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store
            .replace_rules(
                "TSLA",
                Market::Stocks,
                &[crate::store::RuleSpec {
                    rule_type: "new_52w_low".into(),
                    params: json!({}),
                    active: true,
                }],
            )
            .unwrap();

        let cache = Arc::new(ResponseCache::new(Duration::from_secs(900)));
        seed_history(&cache, "TSLA", &vec![100.0; 100]);

        let sink = Arc::new(RecordingSink::new());
        let worker = worker_with(store, cache, sink.clone());

        let stats = worker.run_pass().await.unwrap();
        assert_eq!(stats.symbols, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.evaluated, 0);
        assert_eq!(stats.fired, 0);
        assert!(sink.sent.lock().is_empty(), "no notification for a skipped symbol");
    }

    #[tokio::test]
    async fn one_failing_symbol_does_not_abort_the_pass() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        for ticker in ["AAPL", "ZZZZ"] {
            store
                .replace_rules(
                    ticker,
                    Market::Stocks,
                    &[crate::store::RuleSpec {
                        rule_type: "new_52w_high".into(),
                        params: json!({}),
                        active: true,
                    }],
                )
                .unwrap();
        }

        // AAPL's history is cached; ZZZZ misses the cache and fails at the
        // unroutable upstream.
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(900)));
        let closes: Vec<f64> = (1..=400).map(|i| i as f64).collect();
        seed_history(&cache, "AAPL", &closes);

        let sink = Arc::new(RecordingSink::new());
        let worker = worker_with(store, cache, sink.clone());

        let stats = worker.run_pass().await.unwrap();
        assert_eq!(stats.symbols, 2);
        assert_eq!(stats.evaluated, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.fired, 1);
        assert_eq!(sink.sent.lock().len(), 1);
    }
}
