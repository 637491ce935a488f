// =============================================================================
// Registry store — SQLite persistence for the watchlist and alert rules
// =============================================================================
//
// Schema matches the original service: a `watchlist` table keyed
// (ticker, market) and an `alerts` table keyed (ticker, market, rule_type),
// so re-submitting a rule of the same type replaces its params and active
// flag. Removing a watchlist item cascades to its rules.
//
// The connection sits behind a Mutex: every operation is a single short
// statement (or small batch), so one connection is plenty at this scale.
// =============================================================================

use std::collections::BTreeSet;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::types::{Market, Rule, Symbol, WatchlistItem};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS watchlist (
  ticker TEXT NOT NULL,
  market TEXT NOT NULL,
  name   TEXT DEFAULT '',
  PRIMARY KEY (ticker, market)
);
CREATE TABLE IF NOT EXISTS alerts (
  ticker TEXT NOT NULL,
  market TEXT NOT NULL,
  rule_type TEXT NOT NULL,
  params TEXT NOT NULL DEFAULT '{}',
  active INTEGER NOT NULL DEFAULT 1,
  PRIMARY KEY (ticker, market, rule_type)
);
"#;

/// Incoming rule definition for a bulk replace. Market and ticker come from
/// the enclosing request, not from each rule row.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RuleSpec {
    pub rule_type: String,
    #[serde(default = "default_params")]
    pub params: serde_json::Value,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_params() -> serde_json::Value {
    serde_json::json!({})
}

fn default_active() -> bool {
    true
}

/// SQLite-backed watchlist/rules registry.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.display(), "registry store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // -------------------------------------------------------------------------
    // Watchlist
    // -------------------------------------------------------------------------

    pub fn add_watchlist_item(
        &self,
        ticker: &str,
        market: Market,
        name: &str,
    ) -> Result<(), PersistenceError> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO watchlist (ticker, market, name) VALUES (?1, ?2, ?3)",
            params![ticker, market.as_str(), name],
        )?;
        debug!(ticker, market = %market, "watchlist item added");
        Ok(())
    }

    /// Remove a watchlist item and every rule attached to it.
    pub fn remove_watchlist_item(
        &self,
        ticker: &str,
        market: Market,
    ) -> Result<(), PersistenceError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM watchlist WHERE ticker = ?1 AND market = ?2",
            params![ticker, market.as_str()],
        )?;
        let rules_removed = tx.execute(
            "DELETE FROM alerts WHERE ticker = ?1 AND market = ?2",
            params![ticker, market.as_str()],
        )?;
        tx.commit()?;
        debug!(ticker, market = %market, rules_removed, "watchlist item removed");
        Ok(())
    }

    pub fn list_watchlist(&self) -> Result<Vec<WatchlistItem>, PersistenceError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT ticker, market, name FROM watchlist ORDER BY ticker")?;
        let rows = stmt.query_map([], |row| {
            Ok(WatchlistItem {
                ticker: row.get(0)?,
                market: Market::parse(&row.get::<_, String>(1)?),
                name: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // -------------------------------------------------------------------------
    // Alert rules
    // -------------------------------------------------------------------------

    /// Bulk upsert of rules for one symbol. Each `(ticker, market, rule_type)`
    /// row is replaced wholesale; rule types absent from `rules` are left
    /// untouched, matching the original bulk-set semantics.
    pub fn replace_rules(
        &self,
        ticker: &str,
        market: Market,
        rules: &[RuleSpec],
    ) -> Result<(), PersistenceError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for rule in rules {
            let params_json =
                serde_json::to_string(&rule.params).unwrap_or_else(|_| "{}".to_string());
            tx.execute(
                "INSERT OR REPLACE INTO alerts (ticker, market, rule_type, params, active) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    ticker,
                    market.as_str(),
                    rule.rule_type,
                    params_json,
                    rule.active as i64
                ],
            )?;
        }
        tx.commit()?;
        debug!(ticker, market = %market, count = rules.len(), "rules replaced");
        Ok(())
    }

    /// All rules for a ticker, ordered by rule type.
    pub fn rules_for(&self, ticker: &str) -> Result<Vec<Rule>, PersistenceError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT ticker, market, rule_type, params, active FROM alerts \
             WHERE ticker = ?1 ORDER BY rule_type",
        )?;
        let rows = stmt.query_map(params![ticker], |row| {
            let params_text: String = row.get(3)?;
            Ok(Rule {
                ticker: row.get(0)?,
                market: Market::parse(&row.get::<_, String>(1)?),
                rule_type: row.get(2)?,
                params: serde_json::from_str(&params_text)
                    .unwrap_or_else(|_| serde_json::json!({})),
                active: row.get::<_, i64>(4)? != 0,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Deduplicated set of symbols with at least one active rule. A `BTreeSet`
    /// keeps the iteration order consistent across passes.
    pub fn active_rule_symbols(&self) -> Result<BTreeSet<Symbol>, PersistenceError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT DISTINCT ticker, market FROM alerts WHERE active = 1")?;
        let rows = stmt.query_map([], |row| {
            Ok(Symbol::new(
                row.get::<_, String>(0)?,
                Market::parse(&row.get::<_, String>(1)?),
            ))
        })?;
        Ok(rows.collect::<Result<BTreeSet<_>, _>>()?)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(rule_type: &str, params: serde_json::Value, active: bool) -> RuleSpec {
        RuleSpec {
            rule_type: rule_type.into(),
            params,
            active,
        }
    }

    #[test]
    fn watchlist_add_and_list_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        store
            .add_watchlist_item("TSLA", Market::Stocks, "Tesla")
            .unwrap();
        store
            .add_watchlist_item("C:EURUSD", Market::Fx, "Euro / US Dollar")
            .unwrap();

        let items = store.list_watchlist().unwrap();
        assert_eq!(items.len(), 2);
        // Ordered by ticker.
        assert_eq!(items[0].ticker, "C:EURUSD");
        assert_eq!(items[1].ticker, "TSLA");
        assert_eq!(items[1].name, "Tesla");
    }

    #[test]
    fn readding_a_watchlist_item_replaces_the_name() {
        let store = Store::open_in_memory().unwrap();
        store
            .add_watchlist_item("TSLA", Market::Stocks, "Tesla")
            .unwrap();
        store
            .add_watchlist_item("TSLA", Market::Stocks, "Tesla, Inc.")
            .unwrap();

        let items = store.list_watchlist().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Tesla, Inc.");
    }

    #[test]
    fn replace_rules_upserts_by_rule_type() {
        let store = Store::open_in_memory().unwrap();
        store
            .replace_rules(
                "AAPL",
                Market::Stocks,
                &[spec("pct_drop_day", json!({ "percent": 3.0 }), true)],
            )
            .unwrap();
        store
            .replace_rules(
                "AAPL",
                Market::Stocks,
                &[spec("pct_drop_day", json!({ "percent": 5.0 }), false)],
            )
            .unwrap();

        let rules = store.rules_for("AAPL").unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].param_f64("percent"), Some(5.0));
        assert!(!rules[0].active);
    }

    #[test]
    fn rules_for_is_ordered_by_rule_type() {
        let store = Store::open_in_memory().unwrap();
        store
            .replace_rules(
                "AAPL",
                Market::Stocks,
                &[
                    spec("pct_drop_day", json!({}), true),
                    spec("cross_ma200", json!({}), true),
                    spec("new_52w_high", json!({}), true),
                ],
            )
            .unwrap();

        let rules = store.rules_for("AAPL").unwrap();
        let kinds: Vec<&str> = rules.iter().map(|r| r.rule_type.as_str()).collect();
        assert_eq!(kinds, vec!["cross_ma200", "new_52w_high", "pct_drop_day"]);
    }

    #[test]
    fn removing_watchlist_item_cascades_to_rules() {
        let store = Store::open_in_memory().unwrap();
        store
            .add_watchlist_item("TSLA", Market::Stocks, "Tesla")
            .unwrap();
        store
            .replace_rules(
                "TSLA",
                Market::Stocks,
                &[
                    spec("new_52w_high", json!({}), true),
                    spec("pct_drop_day", json!({ "percent": 4.0 }), true),
                ],
            )
            .unwrap();
        assert_eq!(store.rules_for("TSLA").unwrap().len(), 2);

        store.remove_watchlist_item("TSLA", Market::Stocks).unwrap();

        assert!(store.rules_for("TSLA").unwrap().is_empty());
        assert!(store.list_watchlist().unwrap().is_empty());
        assert!(store.active_rule_symbols().unwrap().is_empty());
    }

    #[test]
    fn active_rule_symbols_deduplicates_and_filters_inactive() {
        let store = Store::open_in_memory().unwrap();
        store
            .replace_rules(
                "AAPL",
                Market::Stocks,
                &[
                    spec("new_52w_high", json!({}), true),
                    spec("pct_drop_day", json!({}), true),
                ],
            )
            .unwrap();
        store
            .replace_rules(
                "MSFT",
                Market::Stocks,
                &[spec("new_52w_low", json!({}), false)],
            )
            .unwrap();

        let symbols = store.active_rule_symbols().unwrap();
        // AAPL once despite two active rules; MSFT absent (rule inactive).
        assert_eq!(symbols.len(), 1);
        assert!(symbols.contains(&Symbol::new("AAPL", Market::Stocks)));
    }

    #[test]
    fn same_ticker_in_two_markets_is_two_symbols() {
        let store = Store::open_in_memory().unwrap();
        store
            .replace_rules("SPX", Market::Stocks, &[spec("new_52w_high", json!({}), true)])
            .unwrap();
        store
            .replace_rules("SPX", Market::Indices, &[spec("new_52w_high", json!({}), true)])
            .unwrap();

        assert_eq!(store.active_rule_symbols().unwrap().len(), 2);
        // rules_for is keyed by ticker alone and returns both rows.
        assert_eq!(store.rules_for("SPX").unwrap().len(), 2);
    }
}
