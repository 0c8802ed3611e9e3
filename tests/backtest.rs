//! Backtest of the consolidation signal against synthetic histories.
//!
//! Builds series with planted consolidations followed by a breakout (or a
//! fizzle), then runs the full pipeline: analyzer → pattern extraction →
//! report → threshold sweep.

use std::sync::Arc;

use chrono::{Days, NaiveDate};

use breakout_watch::config::{BacktestConfig, EngineConfig};
use breakout_watch::engine::backtest::{run_sweep, Backtester, OutcomeStatus};
use breakout_watch::feeds::history::SymbolHistory;
use breakout_watch::models::alert::AlertKind;
use breakout_watch::models::analysis::BreakoutProbability;
use breakout_watch::models::bar::PriceBar;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// 20 widening bars, `quiet` narrow bars, then a drift of `move_pct` over 12 bars.
///
/// The final quiet bar carries a 3x volume burst so the pattern ends HIGH.
/// Drift bars hang below their close, so only the drift itself lifts the highs.
fn planted(symbol: &str, quiet: usize, move_pct: f64) -> SymbolHistory {
    let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    let mut bars = Vec::new();
    let mut push = |close: f64, above: f64, below: f64, volume: u64| {
        let i = bars.len();
        bars.push(PriceBar {
            symbol: symbol.into(),
            date: start + Days::new(i as u64),
            open: close,
            high: close + above,
            low: close - below,
            close,
            volume,
        });
    };

    for i in 0..20 {
        let half = (3.0 + 0.1 * i as f64) / 2.0;
        push(100.0, half, half, 100_000);
    }
    for q in 0..quiet {
        let volume = if q + 1 == quiet { 300_000 } else { 100_000 };
        push(100.0, 0.5, 0.5, volume);
    }
    // A 6-point range ends the consolidation on the first drift bar
    for step in 1..=12 {
        let close = 100.0 * (1.0 + move_pct / 100.0 * step as f64 / 12.0);
        push(close, 0.5, 5.5, 100_000);
    }

    SymbolHistory {
        symbol: symbol.into(),
        bars,
    }
}

fn universe() -> Vec<SymbolHistory> {
    vec![
        planted("BRK1", 6, 8.0),
        planted("BRK2", 8, 6.0),
        planted("FIZZ", 6, -4.0),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_planted_patterns_are_found() {
    let report = Backtester::new(EngineConfig::default(), BacktestConfig::default()).run(&universe());

    assert_eq!(report.symbols, 3);
    assert_eq!(report.total_patterns, 3);
    for pattern in &report.patterns {
        assert_eq!(pattern.probability, BreakoutProbability::High, "{}", pattern.symbol);
        assert!(pattern.is_evaluated());
    }

    let by_symbol = |s: &str| report.patterns.iter().find(|p| p.symbol == s).unwrap();
    assert_eq!(by_symbol("BRK1").status, OutcomeStatus::Breakout);
    assert_eq!(by_symbol("BRK2").status, OutcomeStatus::Breakout);
    assert_eq!(by_symbol("FIZZ").status, OutcomeStatus::NoBreakout);
    assert_eq!(by_symbol("BRK1").peak_tight_days, 6);
    assert_eq!(by_symbol("BRK2").peak_tight_days, 8);

    let high = &report.by_probability[&BreakoutProbability::High];
    assert_eq!(high.total, 3);
    assert_eq!(high.breakouts, 2);
    let accuracy = report.high_accuracy_pct().unwrap();
    assert!((accuracy - 200.0 / 3.0).abs() < 1e-9);
    assert!(report.gain_std_dev_pct.unwrap() > 0.0);
}

#[test]
fn test_report_serializes() {
    let report = Backtester::new(EngineConfig::default(), BacktestConfig::default()).run(&universe());
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["total_patterns"], 3);
    assert_eq!(json["by_probability"]["HIGH"]["breakouts"], 2);
    assert!(json["patterns"][0]["status"].is_string());
}

#[test]
fn test_higher_breakout_bar_lowers_accuracy() {
    let strict = BacktestConfig {
        breakout_threshold_pct: 4.0,
        ..BacktestConfig::default()
    };
    let report = Backtester::new(EngineConfig::default(), strict).run(&universe());
    // Only the 8% drift clears 4% within ten bars
    assert_eq!(report.overall.breakouts, 1);
}

#[test]
fn test_fizzle_is_a_breakdown() {
    let report = Backtester::new(EngineConfig::default(), BacktestConfig::default()).run(&universe());
    let by_symbol = |s: &str| report.patterns.iter().find(|p| p.symbol == s).unwrap();

    // Lowest low ten bars out: 100 * (1 - 0.04 * 7/12) - 5.5
    let fizz = by_symbol("FIZZ");
    assert!((fizz.max_loss_pct.unwrap() + 7.0 + 5.0 / 6.0).abs() < 1e-9);
    assert!(fizz.breakdown);

    // Dipping first does not turn a breakout into a breakdown
    let brk1 = by_symbol("BRK1");
    assert!(brk1.max_loss_pct.unwrap() < -2.0);
    assert!(!brk1.breakdown);
}

#[test]
fn test_alert_performance() {
    let report = Backtester::new(EngineConfig::default(), BacktestConfig::default()).run(&universe());
    let alerts = &report.alerts;

    // One consolidation start and one HIGH per symbol
    assert_eq!(alerts.total_alerts, 6);
    assert_eq!(alerts.by_kind[&AlertKind::ConsolidationStart].total, 3);
    assert_eq!(alerts.by_kind[&AlertKind::BreakoutReady].total, 3);
    assert_eq!((alerts.breakouts, alerts.non_breakouts, alerts.pending), (4, 2, 0));
    assert_eq!(alerts.breakdowns, 2);
    assert!((alerts.win_rate_pct.unwrap() - 200.0 / 3.0).abs() < 1e-9);

    // BRK1 from its HIGH bar: 100 * (1 + 0.08 * 10/12) + 0.5
    assert!((alerts.best_gain_pct.unwrap() - (7.0 + 1.0 / 6.0)).abs() < 1e-9);
    // FIZZ from its HIGH bar: 100 * (1 - 0.04 * 10/12) - 5.5
    assert!((alerts.worst_loss_pct.unwrap() + 8.0 + 5.0 / 6.0).abs() < 1e-9);

    let fizz = &alerts.by_symbol["FIZZ"];
    assert_eq!((fizz.total, fizz.breakouts), (2, 0));
    assert!(fizz.avg_move_pct.unwrap() < 0.0);
    assert_eq!(alerts.by_symbol["BRK1"].breakouts, 2);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["alerts"]["by_kind"]["BREAKOUT_READY"]["total"], 3);
}

#[tokio::test]
async fn test_threshold_sweep() {
    let configs: Vec<EngineConfig> = (2..=9).map(|d| EngineConfig::default().with_threshold_days(d)).collect();
    let reports = run_sweep(Arc::new(universe()), configs, BacktestConfig::default()).await;
    let totals: Vec<usize> = reports.iter().map(|r| r.as_ref().unwrap().total_patterns).collect();

    // BRK1 and FIZZ reach 6 tight days, BRK2 reaches 8
    assert_eq!(totals, vec![3, 3, 3, 3, 3, 1, 1, 0]);
}
