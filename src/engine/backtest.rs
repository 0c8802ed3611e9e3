//! Replays historical series through the engine and measures how often a
//! flagged consolidation was followed by a breakout.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use statrs::statistics::Statistics;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::{BacktestConfig, EngineConfig};
use crate::error::AnalysisError;
use crate::feeds::history::SymbolHistory;
use crate::models::alert::AlertKind;
use crate::models::analysis::{BreakoutProbability, SeriesAnalysis};
use crate::models::bar::PriceBar;

use super::analyzer::ConsolidationAnalyzer;
use super::transitions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Breakout,
    NoBreakout,
    /// Not enough bars after the start to judge yet.
    Pending,
}

/// One consolidation run and what price did afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternOutcome {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_price: f64,
    pub peak_tight_days: u32,
    pub probability: BreakoutProbability, // rating on the last consolidating bar
    pub confidence: Option<u8>,
    pub max_gain_pct: Option<f64>,
    pub max_loss_pct: Option<f64>, // lowest low vs start price, usually negative
    pub bars_to_max: Option<usize>,
    pub status: OutcomeStatus,
    pub breakdown: bool, // fell past -threshold without breaking out
}

impl PatternOutcome {
    pub fn is_evaluated(&self) -> bool {
        self.status != OutcomeStatus::Pending
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BucketStats {
    pub total: usize,
    pub breakouts: usize,
    pub pending: usize,
    pub accuracy_pct: Option<f64>, // breakouts / evaluated
    pub mean_gain_pct: Option<f64>,
}

impl BucketStats {
    pub fn evaluated(&self) -> usize {
        self.total - self.pending
    }

    fn from_patterns<'a>(patterns: impl Iterator<Item = &'a PatternOutcome>) -> Self {
        let mut stats = BucketStats::default();
        let mut gains = Vec::new();
        for p in patterns {
            stats.total += 1;
            match p.status {
                OutcomeStatus::Breakout => stats.breakouts += 1,
                OutcomeStatus::Pending => stats.pending += 1,
                OutcomeStatus::NoBreakout => {}
            }
            if p.is_evaluated() {
                gains.extend(p.max_gain_pct);
            }
        }
        let evaluated = stats.evaluated();
        stats.accuracy_pct = (evaluated > 0).then(|| stats.breakouts as f64 / evaluated as f64 * 100.0);
        stats.mean_gain_pct = (!gains.is_empty()).then(|| gains.iter().mean());
        stats
    }
}

/// What price did after one emitted alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertOutcome {
    pub symbol: String,
    pub date: NaiveDate,
    pub kind: AlertKind,
    pub probability: BreakoutProbability,
    pub price_at_alert: f64,
    pub max_gain_pct: Option<f64>,
    pub max_loss_pct: Option<f64>,
    pub bars_to_max: Option<usize>,
    pub status: OutcomeStatus,
    pub breakdown: bool,
}

impl AlertOutcome {
    /// Gain for a breakout, drawdown otherwise; `None` while pending.
    fn signed_move(&self) -> Option<f64> {
        match self.status {
            OutcomeStatus::Breakout => self.max_gain_pct,
            OutcomeStatus::NoBreakout => self.max_loss_pct,
            OutcomeStatus::Pending => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MoveStats {
    pub total: usize,
    pub breakouts: usize,
    pub non_breakouts: usize,
    pub pending: usize,
    pub avg_move_pct: Option<f64>,
}

impl MoveStats {
    fn from_alerts<'a>(alerts: impl Iterator<Item = &'a AlertOutcome>) -> Self {
        let mut stats = MoveStats::default();
        let mut moves = Vec::new();
        for a in alerts {
            stats.total += 1;
            match a.status {
                OutcomeStatus::Breakout => stats.breakouts += 1,
                OutcomeStatus::NoBreakout => stats.non_breakouts += 1,
                OutcomeStatus::Pending => stats.pending += 1,
            }
            moves.extend(a.signed_move());
        }
        stats.avg_move_pct = (!moves.is_empty()).then(|| moves.iter().mean());
        stats
    }
}

/// Hit rate of the alerts the engine would have sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertPerformance {
    pub total_alerts: usize,
    pub breakouts: usize,
    pub non_breakouts: usize,
    pub pending: usize,
    pub breakdowns: usize,
    pub win_rate_pct: Option<f64>,
    pub avg_gain_pct: Option<f64>,
    pub best_gain_pct: Option<f64>,
    pub avg_loss_pct: Option<f64>,
    pub worst_loss_pct: Option<f64>,
    pub by_kind: BTreeMap<AlertKind, MoveStats>,
    pub by_symbol: BTreeMap<String, MoveStats>,
    pub alerts: Vec<AlertOutcome>,
}

impl AlertPerformance {
    pub fn from_outcomes(alerts: Vec<AlertOutcome>) -> Self {
        let overall = MoveStats::from_alerts(alerts.iter());
        let gains: Vec<f64> = alerts
            .iter()
            .filter(|a| a.status == OutcomeStatus::Breakout)
            .filter_map(|a| a.max_gain_pct)
            .collect();
        let losses: Vec<f64> = alerts
            .iter()
            .filter(|a| a.status == OutcomeStatus::NoBreakout)
            .filter_map(|a| a.max_loss_pct)
            .collect();

        let mut kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        let by_kind = kinds
            .into_iter()
            .map(|k| (k, MoveStats::from_alerts(alerts.iter().filter(|a| a.kind == k))))
            .collect();

        let mut symbols: Vec<&str> = alerts.iter().map(|a| a.symbol.as_str()).collect();
        symbols.sort_unstable();
        symbols.dedup();
        let by_symbol = symbols
            .into_iter()
            .map(|s| (s.to_string(), MoveStats::from_alerts(alerts.iter().filter(|a| a.symbol == s))))
            .collect();

        let evaluated = overall.breakouts + overall.non_breakouts;
        Self {
            total_alerts: overall.total,
            breakouts: overall.breakouts,
            non_breakouts: overall.non_breakouts,
            pending: overall.pending,
            breakdowns: alerts.iter().filter(|a| a.breakdown).count(),
            win_rate_pct: (evaluated > 0).then(|| overall.breakouts as f64 / evaluated as f64 * 100.0),
            avg_gain_pct: (!gains.is_empty()).then(|| gains.iter().mean()),
            best_gain_pct: (!gains.is_empty()).then(|| gains.iter().copied().fold(f64::MIN, f64::max)),
            avg_loss_pct: (!losses.is_empty()).then(|| losses.iter().mean()),
            worst_loss_pct: (!losses.is_empty()).then(|| losses.iter().copied().fold(f64::MAX, f64::min)),
            by_kind,
            by_symbol,
            alerts,
        }
    }
}

/// Price excursion over the look-forward window.
struct Excursion {
    max_gain_pct: f64,
    max_loss_pct: f64,
    bars_to_max: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub engine: EngineConfig,
    pub symbols: usize,
    pub skipped_symbols: Vec<String>,
    pub total_patterns: usize,
    pub overall: BucketStats,
    pub by_probability: BTreeMap<BreakoutProbability, BucketStats>,
    pub by_tight_days: BTreeMap<u32, BucketStats>,
    pub mean_bars_to_breakout: Option<f64>,
    pub gain_std_dev_pct: Option<f64>,
    pub patterns: Vec<PatternOutcome>,
    pub alerts: AlertPerformance,
}

impl BacktestReport {
    pub fn high_accuracy_pct(&self) -> Option<f64> {
        self.by_probability
            .get(&BreakoutProbability::High)
            .and_then(|b| b.accuracy_pct)
    }

    /// Tight-day count that historically led to breakouts most often.
    ///
    /// Only buckets with at least `min_samples` evaluated patterns count;
    /// ties go to the larger sample. `None` when nothing qualifies or the
    /// winner equals the configured threshold.
    pub fn suggest_threshold(&self, min_samples: usize) -> Option<u32> {
        let best = self
            .by_tight_days
            .iter()
            .filter(|(_, b)| b.evaluated() >= min_samples.max(1))
            .filter_map(|(days, b)| b.accuracy_pct.map(|acc| (*days, acc, b.evaluated())))
            .max_by(|a, b| a.1.total_cmp(&b.1).then(a.2.cmp(&b.2)).then(b.0.cmp(&a.0)))?;

        (best.0 != self.engine.consolidation_threshold_days).then_some(best.0)
    }
}

pub struct Backtester {
    engine: EngineConfig,
    config: BacktestConfig,
}

impl Backtester {
    pub fn new(engine: EngineConfig, config: BacktestConfig) -> Self {
        Self { engine, config }
    }

    /// Consolidation runs in one analysed series, with their outcomes.
    ///
    /// `bars` must be the bars the series was computed from; only the
    /// trailing `series.records.len()` of them are used.
    pub fn patterns(&self, series: &SeriesAnalysis, bars: &[PriceBar]) -> Vec<PatternOutcome> {
        let bars = &bars[bars.len().saturating_sub(series.records.len())..];
        let records = &series.records;
        let mut out = Vec::new();
        let mut i = 0;

        while i < records.len() {
            if !records[i].is_consolidating {
                i += 1;
                continue;
            }
            let start = i;
            while i + 1 < records.len() && records[i + 1].is_consolidating {
                i += 1;
            }
            let end = i;
            let peak = records[start..=end]
                .iter()
                .fold(0, |peak, r| peak.max(r.consecutive_tight_days));
            out.push(self.outcome(series, bars, start, end, peak));
            i += 1;
        }
        out
    }

    fn outcome(&self, series: &SeriesAnalysis, bars: &[PriceBar], start: usize, end: usize, peak: u32) -> PatternOutcome {
        let first = &series.records[start];
        let last = &series.records[end];
        let excursion = self.excursion(bars, start, first.close);
        let (status, breakdown) = self.judge(excursion.as_ref());

        PatternOutcome {
            symbol: series.symbol.clone(),
            start_date: first.date,
            end_date: last.date,
            start_price: first.close,
            peak_tight_days: peak,
            probability: last.breakout_probability,
            confidence: last.confidence_score,
            max_gain_pct: excursion.as_ref().map(|e| e.max_gain_pct),
            max_loss_pct: excursion.as_ref().map(|e| e.max_loss_pct),
            bars_to_max: excursion.as_ref().map(|e| e.bars_to_max),
            status,
            breakdown,
        }
    }

    /// Highest high and lowest low of the `lookforward_bars` bars after
    /// `start`, relative to `start_price`. `None` until the window is complete.
    fn excursion(&self, bars: &[PriceBar], start: usize, start_price: f64) -> Option<Excursion> {
        let lookforward = self.config.lookforward_bars;
        let after = bars.get(start + 1..)?;
        let future = &after[..after.len().min(lookforward)];
        if future.is_empty() || future.len() < lookforward {
            return None;
        }

        // First bar reaching the highest high
        let (offset, max_high) = future
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (j, b)| if b.high > best.1 { (j, b.high) } else { best });
        let min_low = future.iter().map(|b| b.low).fold(f64::MAX, f64::min);

        Some(Excursion {
            max_gain_pct: (max_high - start_price) / start_price * 100.0,
            max_loss_pct: (min_low - start_price) / start_price * 100.0,
            bars_to_max: offset + 1,
        })
    }

    fn judge(&self, excursion: Option<&Excursion>) -> (OutcomeStatus, bool) {
        let threshold = self.config.breakout_threshold_pct;
        match excursion {
            None => (OutcomeStatus::Pending, false),
            Some(e) if e.max_gain_pct >= threshold => (OutcomeStatus::Breakout, false),
            Some(e) => (OutcomeStatus::NoBreakout, e.max_loss_pct < -threshold),
        }
    }

    /// Every alert the series would have raised, with its outcome.
    pub fn alert_outcomes(&self, series: &SeriesAnalysis, bars: &[PriceBar]) -> Vec<AlertOutcome> {
        let bars = &bars[bars.len().saturating_sub(series.records.len())..];
        transitions::scan(series)
            .into_iter()
            .filter_map(|alert| {
                let idx = bars.binary_search_by_key(&alert.date, |b| b.date).ok()?;
                let excursion = self.excursion(bars, idx, alert.close);
                let (status, breakdown) = self.judge(excursion.as_ref());
                Some(AlertOutcome {
                    symbol: alert.symbol,
                    date: alert.date,
                    kind: alert.kind,
                    probability: alert.probability,
                    price_at_alert: alert.close,
                    max_gain_pct: excursion.as_ref().map(|e| e.max_gain_pct),
                    max_loss_pct: excursion.as_ref().map(|e| e.max_loss_pct),
                    bars_to_max: excursion.as_ref().map(|e| e.bars_to_max),
                    status,
                    breakdown,
                })
            })
            .collect()
    }

    pub fn run(&self, histories: &[SymbolHistory]) -> BacktestReport {
        let analyzer = ConsolidationAnalyzer::new(&self.engine);
        let mut patterns = Vec::new();
        let mut alerts = Vec::new();
        let mut skipped = Vec::new();

        for history in histories {
            match analyzer.analyze(&history.symbol, &history.bars) {
                Ok(series) => {
                    patterns.extend(self.patterns(&series, &history.bars));
                    alerts.extend(self.alert_outcomes(&series, &history.bars));
                }
                Err(e) => {
                    warn!("Backtest skipping {}: {e}", history.symbol);
                    skipped.push(history.symbol.clone());
                }
            }
        }

        let report = self.report(histories.len(), skipped, patterns, alerts);
        info!(
            "Backtest threshold={}d: {} patterns, accuracy={} HIGH accuracy={}, {} alerts win rate={}",
            self.engine.consolidation_threshold_days,
            report.total_patterns,
            fmt_pct(report.overall.accuracy_pct),
            fmt_pct(report.high_accuracy_pct()),
            report.alerts.total_alerts,
            fmt_pct(report.alerts.win_rate_pct),
        );
        report
    }

    fn report(
        &self,
        symbols: usize,
        skipped_symbols: Vec<String>,
        patterns: Vec<PatternOutcome>,
        alerts: Vec<AlertOutcome>,
    ) -> BacktestReport {
        // A run can end before the volume baseline exists, so unrated
        // patterns get their own bucket and the buckets cover every pattern.
        let mut by_probability = BTreeMap::new();
        for probability in [
            BreakoutProbability::InsufficientData,
            BreakoutProbability::Low,
            BreakoutProbability::Medium,
            BreakoutProbability::High,
        ] {
            let bucket = BucketStats::from_patterns(patterns.iter().filter(|p| p.probability == probability));
            if bucket.total > 0 {
                by_probability.insert(probability, bucket);
            }
        }

        let mut days: Vec<u32> = patterns.iter().map(|p| p.peak_tight_days).collect();
        days.sort_unstable();
        days.dedup();
        let by_tight_days = days
            .into_iter()
            .map(|d| (d, BucketStats::from_patterns(patterns.iter().filter(|p| p.peak_tight_days == d))))
            .collect();

        let to_breakout: Vec<f64> = patterns
            .iter()
            .filter(|p| p.status == OutcomeStatus::Breakout)
            .filter_map(|p| p.bars_to_max.map(|b| b as f64))
            .collect();
        let gains: Vec<f64> = patterns
            .iter()
            .filter(|p| p.is_evaluated())
            .filter_map(|p| p.max_gain_pct)
            .collect();

        BacktestReport {
            engine: self.engine.clone(),
            symbols,
            skipped_symbols,
            total_patterns: patterns.len(),
            overall: BucketStats::from_patterns(patterns.iter()),
            by_probability,
            by_tight_days,
            mean_bars_to_breakout: (!to_breakout.is_empty()).then(|| to_breakout.iter().mean()),
            gain_std_dev_pct: (gains.len() >= 2).then(|| gains.iter().std_dev()),
            patterns,
            alerts: AlertPerformance::from_outcomes(alerts),
        }
    }
}

/// Backtests several engine configs over the same histories in parallel.
///
/// Reports come back in the order of `configs`.
pub async fn run_sweep(
    histories: Arc<Vec<SymbolHistory>>,
    configs: Vec<EngineConfig>,
    backtest: BacktestConfig,
) -> Vec<Result<BacktestReport, AnalysisError>> {
    let mut tasks = JoinSet::new();
    let total = configs.len();

    for (idx, engine) in configs.into_iter().enumerate() {
        let histories = histories.clone();
        let backtest = backtest.clone();
        tasks.spawn_blocking(move || (idx, Backtester::new(engine, backtest).run(&histories)));
    }

    let mut slots: Vec<Option<BacktestReport>> = (0..total).map(|_| None).collect();
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, report)) => slots[idx] = Some(report),
            Err(e) => failures.push(e.to_string()),
        }
    }

    let mut failures = failures.into_iter();
    slots
        .into_iter()
        .map(|slot| {
            slot.ok_or_else(|| AnalysisError::TaskFailed {
                symbol: "sweep".into(),
                reason: failures.next().unwrap_or_else(|| "backtest task lost".into()),
            })
        })
        .collect()
}

fn fmt_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".into(), |v| format!("{v:.1}%"))
}
