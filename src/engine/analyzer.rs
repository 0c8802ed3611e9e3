use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::AnalysisError;
use crate::models::analysis::{AnalysisRecord, SeriesAnalysis};
use crate::models::bar::PriceBar;
use crate::signals::probability::{BreakoutScorer, ScoreInput};
use crate::signals::tightness::TightnessClassifier;
use crate::signals::volatility::VolatilityCalculator;
use crate::signals::volume::VolumeAnomalyDetector;

/// Runs the full consolidation pipeline over one symbol's history.
///
/// Pipeline per run:
///   - validate bars (symbol, ordering, OHLC sanity)
///   - true range + Wilder ATR
///   - tight-day streaks and volume anomalies
///   - rule-table rating and confidence score
///
/// Nothing is carried between runs; each call recomputes from the first
/// bar of the (optionally truncated) window.
pub struct ConsolidationAnalyzer {
    volatility: VolatilityCalculator,
    tightness: TightnessClassifier,
    volume: VolumeAnomalyDetector,
    scorer: BreakoutScorer,
    max_lookback: Option<usize>,
    required_bars: usize,
}

impl ConsolidationAnalyzer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            volatility: VolatilityCalculator::new(config.atr_period),
            tightness: TightnessClassifier::new(config.consolidation_threshold_days),
            volume: VolumeAnomalyDetector::new(config.volume_avg_period, config.volume_spike_multiplier),
            scorer: BreakoutScorer::new(config),
            max_lookback: config.max_lookback,
            required_bars: config.required_bars(),
        }
    }

    pub fn required_bars(&self) -> usize {
        self.required_bars
    }

    /// Analyse every bar of the window, oldest first.
    ///
    /// Bars without enough trailing history come back rated
    /// `InsufficientData`. Any malformed or misordered bar rejects the whole
    /// symbol, since skipping it would silently break streak continuity.
    pub fn analyze(&self, symbol: &str, bars: &[PriceBar]) -> Result<SeriesAnalysis, AnalysisError> {
        validate_series(symbol, bars)?;

        let window = match self.max_lookback {
            Some(n) if bars.len() > n => &bars[bars.len() - n..],
            _ => bars,
        };

        let vol = self.volatility.compute(window);
        let tight = self.tightness.classify(&vol.daily_range, &vol.atr);
        let volume = self.volume.detect(window);

        let records: Vec<AnalysisRecord> = window
            .iter()
            .enumerate()
            .map(|(i, bar)| {
                let score = self.scorer.score(&ScoreInput {
                    atr: vol.atr[i],
                    daily_range: vol.daily_range[i],
                    avg_volume: volume[i].avg_volume,
                    consecutive_tight_days: tight[i].consecutive_tight_days,
                    volume_spike: volume[i].volume_spike,
                });
                AnalysisRecord {
                    symbol: symbol.to_string(),
                    date: bar.date,
                    close: bar.close,
                    volume: bar.volume,
                    true_range: vol.true_range[i],
                    atr: vol.atr[i],
                    daily_range: vol.daily_range[i],
                    consecutive_tight_days: tight[i].consecutive_tight_days,
                    avg_volume: volume[i].avg_volume,
                    volume_ratio: volume[i].volume_ratio,
                    is_consolidating: tight[i].is_consolidating,
                    volume_spike: volume[i].volume_spike,
                    breakout_probability: score.probability,
                    confidence_score: score.confidence,
                    range_tightness_pct: score.range_tightness_pct,
                }
            })
            .collect();

        if let Some(last) = records.last() {
            debug!(
                "{symbol}: {} bars, latest {} tight_days={} consolidating={} spike={} probability={}",
                records.len(),
                last.date,
                last.consecutive_tight_days,
                last.is_consolidating,
                last.volume_spike,
                last.breakout_probability,
            );
        }

        Ok(SeriesAnalysis {
            symbol: symbol.to_string(),
            records,
        })
    }

    /// Rating for the most recent bar only.
    ///
    /// Returns `InsufficientHistory` rather than a degenerate `Low` when the
    /// window is too short for both baselines.
    pub fn latest(&self, symbol: &str, bars: &[PriceBar]) -> Result<AnalysisRecord, AnalysisError> {
        let available = self.max_lookback.map_or(bars.len(), |n| bars.len().min(n));
        if available < self.required_bars {
            // Malformed input outranks a short history
            validate_series(symbol, bars)?;
            warn!(
                "Insufficient data for {symbol}: {available} bars, need {}",
                self.required_bars
            );
            return Err(AnalysisError::InsufficientHistory {
                symbol: symbol.to_string(),
                bars: available,
                required: self.required_bars,
            });
        }

        let series = self.analyze(symbol, bars)?;
        series.latest_rated(self.required_bars).cloned()
    }
}

/// Convenience entry point: build an analyzer for `config` and run it once.
pub fn analyze_series(
    symbol: &str,
    bars: &[PriceBar],
    config: &EngineConfig,
) -> Result<SeriesAnalysis, AnalysisError> {
    ConsolidationAnalyzer::new(config).analyze(symbol, bars)
}

fn validate_series(symbol: &str, bars: &[PriceBar]) -> Result<(), AnalysisError> {
    let mut previous = None;
    for bar in bars {
        if bar.symbol != symbol {
            return Err(AnalysisError::SymbolMismatch {
                expected: symbol.to_string(),
                found: bar.symbol.clone(),
                date: bar.date,
            });
        }
        bar.validate().map_err(|defect| AnalysisError::MalformedBar {
            symbol: symbol.to_string(),
            date: bar.date,
            defect,
        })?;
        if let Some(prev) = previous {
            if bar.date <= prev {
                return Err(AnalysisError::OutOfOrder {
                    symbol: symbol.to_string(),
                    date: bar.date,
                    previous: prev,
                });
            }
        }
        previous = Some(bar.date);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BarDefect;
    use crate::models::analysis::BreakoutProbability;
    use chrono::{Days, NaiveDate};

    fn flat_bars(symbol: &str, n: usize) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| PriceBar {
                symbol: symbol.into(),
                date: start + Days::new(i as u64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1_000,
            })
            .collect()
    }

    #[test]
    fn test_one_record_per_bar() {
        let bars = flat_bars("AAPL", 25);
        let series = analyze_series("AAPL", &bars, &EngineConfig::default()).unwrap();
        assert_eq!(series.records.len(), 25);
        assert_eq!(series.records[0].true_range, None);
        assert_eq!(series.records[13].atr, None);
        assert_eq!(series.records[14].atr, Some(2.0));
        assert_eq!(series.records[18].breakout_probability, BreakoutProbability::InsufficientData);
        assert!(series.records[19].breakout_probability.is_rated());
    }

    #[test]
    fn test_flat_series_is_tight_from_first_atr_bar() {
        // Range equal to ATR counts as tight, so a flat tape consolidates.
        let bars = flat_bars("AAPL", 25);
        let series = analyze_series("AAPL", &bars, &EngineConfig::default()).unwrap();
        assert_eq!(series.records[14].consecutive_tight_days, 1);
        assert_eq!(series.records[24].consecutive_tight_days, 11);
        assert_eq!(series.records[24].breakout_probability, BreakoutProbability::Medium);
        assert_eq!(series.records[24].range_tightness_pct, Some(0.0));
        assert_eq!(series.records[24].confidence_score, Some(40));
    }

    #[test]
    fn test_latest_reports_insufficient_history() {
        let analyzer = ConsolidationAnalyzer::new(&EngineConfig::default());
        let err = analyzer.latest("AAPL", &flat_bars("AAPL", 19)).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::InsufficientHistory {
                symbol: "AAPL".into(),
                bars: 19,
                required: 20,
            }
        );
        assert!(analyzer.latest("AAPL", &flat_bars("AAPL", 20)).is_ok());
    }

    #[test]
    fn test_rejects_malformed_bar_with_symbol_and_date() {
        let mut bars = flat_bars("AAPL", 20);
        bars[7].low = 102.0;
        let err = analyze_series("AAPL", &bars, &EngineConfig::default()).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::MalformedBar {
                symbol: "AAPL".into(),
                date: bars[7].date,
                defect: BarDefect::HighBelowLow,
            }
        );
    }

    #[test]
    fn test_rejects_duplicate_dates_and_foreign_symbols() {
        let mut bars = flat_bars("AAPL", 20);
        bars[5].date = bars[4].date;
        assert!(matches!(
            analyze_series("AAPL", &bars, &EngineConfig::default()),
            Err(AnalysisError::OutOfOrder { .. })
        ));

        let mut bars = flat_bars("AAPL", 20);
        bars[3].symbol = "MSFT".into();
        assert!(matches!(
            analyze_series("AAPL", &bars, &EngineConfig::default()),
            Err(AnalysisError::SymbolMismatch { .. })
        ));
    }

    #[test]
    fn test_max_lookback_restricts_window() {
        let config = EngineConfig {
            max_lookback: Some(30),
            ..EngineConfig::default()
        };
        let bars = flat_bars("AAPL", 100);
        let series = analyze_series("AAPL", &bars, &config).unwrap();
        assert_eq!(series.records.len(), 30);
        assert_eq!(series.records[0].date, bars[70].date);
        assert_eq!(series.records[0].true_range, None);
    }
}
