// =============================================================================
// Rule evaluation — fire/no-fire decisions per rule type
// =============================================================================
//
// Evaluation is stateless: every pass decides purely from the current and
// previous observations, with no persisted "last fired" marker. A condition
// that stays true across N consecutive passes therefore fires N times; the
// original service behaves the same way and suppression is deliberately out
// of scope here.
// =============================================================================

use serde::Serialize;
use tracing::debug;

use crate::indicators::snapshot::IndicatorSnapshot;
use crate::types::Rule;

/// Default threshold for `pct_drop_day` when no `percent` param is set.
pub const DEFAULT_DROP_PERCENT: f64 = 3.0;

/// The rule kinds this version understands. Stored rule types are parsed at
/// evaluation time; anything unrecognised is skipped so rows written by a
/// newer version never break the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    CrossMa200,
    New52wHigh,
    New52wLow,
    PctDropDay,
}

impl RuleKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cross_ma200" => Some(Self::CrossMa200),
            "new_52w_high" => Some(Self::New52wHigh),
            "new_52w_low" => Some(Self::New52wLow),
            "pct_drop_day" => Some(Self::PctDropDay),
            _ => None,
        }
    }
}

/// A triggered alert, ready to hand to the notification sink.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub ticker: String,
    pub rule_type: String,
    pub subject: String,
    pub body: String,
}

/// Evaluate one rule against the symbol's indicator snapshot.
///
/// Returns `Some(event)` when the rule fires. Inactive rules and unknown
/// rule types never fire.
pub fn evaluate(rule: &Rule, snap: &IndicatorSnapshot) -> Option<AlertEvent> {
    if !rule.active {
        return None;
    }

    let Some(kind) = RuleKind::parse(&rule.rule_type) else {
        debug!(
            ticker = %rule.ticker,
            rule_type = %rule.rule_type,
            "ignoring unrecognised rule type"
        );
        return None;
    };

    match kind {
        RuleKind::New52wHigh => new_52w_high(rule, snap),
        RuleKind::New52wLow => new_52w_low(rule, snap),
        RuleKind::CrossMa200 => cross_ma200(rule, snap),
        RuleKind::PctDropDay => pct_drop_day(rule, snap),
    }
}

// -----------------------------------------------------------------------------
// Individual rule conditions
// -----------------------------------------------------------------------------

fn new_52w_high(rule: &Rule, snap: &IndicatorSnapshot) -> Option<AlertEvent> {
    // Inclusive: the trailing window contains the current bar, so "at" the
    // high counts as making a new high.
    if snap.current_close >= snap.trailing_52w_high {
        return Some(event(
            rule,
            format!("{}: new 52-week high", rule.ticker),
            format!(
                "{} closed at {:.4}, at or above its 52-week high of {:.4}.",
                rule.ticker, snap.current_close, snap.trailing_52w_high
            ),
        ));
    }
    None
}

fn new_52w_low(rule: &Rule, snap: &IndicatorSnapshot) -> Option<AlertEvent> {
    if snap.current_close <= snap.trailing_52w_low {
        return Some(event(
            rule,
            format!("{}: new 52-week low", rule.ticker),
            format!(
                "{} closed at {:.4}, at or below its 52-week low of {:.4}.",
                rule.ticker, snap.current_close, snap.trailing_52w_low
            ),
        ));
    }
    None
}

fn cross_ma200(rule: &Rule, snap: &IndicatorSnapshot) -> Option<AlertEvent> {
    // Both MA values must be defined; with fewer than 201 bars of history the
    // previous MA is absent and no price motion qualifies.
    let ma_cur = snap.ma200_current()?;
    let ma_prev = snap.ma200_prev()?;
    let prev_close = snap.prev_close?;
    let cur = snap.current_close;

    let crossed_up = prev_close < ma_prev && cur >= ma_cur;
    let crossed_down = prev_close > ma_prev && cur <= ma_cur;

    let direction = if crossed_up {
        "UP"
    } else if crossed_down {
        "DOWN"
    } else {
        return None;
    };

    Some(event(
        rule,
        format!("{}: MA200 cross {}", rule.ticker, direction),
        format!(
            "{} crossed {} through its 200-day moving average: close {:.4}, MA200 {:.4} (previous close {:.4}).",
            rule.ticker, direction, cur, ma_cur, prev_close
        ),
    ))
}

fn pct_drop_day(rule: &Rule, snap: &IndicatorSnapshot) -> Option<AlertEvent> {
    let prev_close = snap.prev_close?;
    if prev_close == 0.0 {
        return None;
    }

    let threshold = rule
        .param_f64("percent")
        .unwrap_or(DEFAULT_DROP_PERCENT)
        .abs();
    let change_pct = (snap.current_close - prev_close) / prev_close * 100.0;

    if change_pct <= -threshold {
        return Some(event(
            rule,
            format!("{}: dropped {:.2}% on the day", rule.ticker, change_pct.abs()),
            format!(
                "{} fell {:.2}% vs the previous close (threshold -{:.2}%): {:.4} -> {:.4}.",
                rule.ticker, change_pct.abs(), threshold, prev_close, snap.current_close
            ),
        ));
    }
    None
}

fn event(rule: &Rule, subject: String, body: String) -> AlertEvent {
    AlertEvent {
        ticker: rule.ticker.clone(),
        rule_type: rule.rule_type.clone(),
        subject,
        body,
    }
}
