use crate::models::alert::{Alert, AlertKind};
use crate::models::analysis::{AnalysisRecord, SeriesAnalysis};

/// Alert kind raised when moving from `previous` to `current`, if any.
///
/// A missing previous record counts as neither consolidating nor HIGH.
/// Becoming HIGH outranks starting a consolidation on the same bar.
pub fn detect(previous: Option<&AnalysisRecord>, current: &AnalysisRecord) -> Option<AlertKind> {
    let was_high = previous.is_some_and(|p| p.is_high());
    let was_consolidating = previous.is_some_and(|p| p.is_consolidating);

    if current.is_high() && !was_high {
        Some(AlertKind::BreakoutReady)
    } else if current.is_consolidating && !was_consolidating {
        Some(AlertKind::ConsolidationStart)
    } else {
        None
    }
}

/// Alert for the latest bar of a series.
pub fn latest(series: &SeriesAnalysis) -> Option<Alert> {
    let (previous, current) = series.last_pair()?;
    detect(previous, current).map(|kind| Alert::from_record(kind, current))
}

/// Replays a whole series and returns every alert it would have raised.
pub fn scan(series: &SeriesAnalysis) -> Vec<Alert> {
    let mut previous = None;
    let mut alerts = Vec::new();
    for current in &series.records {
        if let Some(kind) = detect(previous, current) {
            alerts.push(Alert::from_record(kind, current));
        }
        previous = Some(current);
    }
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::alert::Severity;
    use crate::models::analysis::BreakoutProbability;
    use chrono::NaiveDate;

    fn record(day: u32, consolidating: bool, probability: BreakoutProbability) -> AnalysisRecord {
        AnalysisRecord {
            symbol: "NVDA".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            close: 880.0,
            volume: 40_000_000,
            true_range: Some(10.0),
            atr: Some(20.0),
            daily_range: 10.0,
            consecutive_tight_days: if consolidating { 3 } else { 1 },
            avg_volume: Some(30_000_000.0),
            volume_ratio: Some(1.33),
            is_consolidating: consolidating,
            volume_spike: probability == BreakoutProbability::High,
            breakout_probability: probability,
            confidence_score: Some(60),
            range_tightness_pct: Some(50.0),
        }
    }

    #[test]
    fn test_consolidation_start() {
        let prev = record(1, false, BreakoutProbability::Low);
        let cur = record(2, true, BreakoutProbability::Medium);
        assert_eq!(detect(Some(&prev), &cur), Some(AlertKind::ConsolidationStart));
        assert_eq!(detect(Some(&cur), &cur), None);
    }

    #[test]
    fn test_breakout_outranks_consolidation_start() {
        let prev = record(1, false, BreakoutProbability::Low);
        let cur = record(2, true, BreakoutProbability::High);
        assert_eq!(detect(Some(&prev), &cur), Some(AlertKind::BreakoutReady));
        assert_eq!(detect(None, &cur), Some(AlertKind::BreakoutReady));

        // Staying HIGH does not re-alert
        assert_eq!(detect(Some(&cur), &record(3, true, BreakoutProbability::High)), None);
    }

    #[test]
    fn test_scan_replays_series() {
        let series = SeriesAnalysis {
            symbol: "NVDA".into(),
            records: vec![
                record(1, false, BreakoutProbability::InsufficientData),
                record(2, true, BreakoutProbability::Medium),
                record(3, true, BreakoutProbability::Medium),
                record(4, true, BreakoutProbability::High),
                record(5, false, BreakoutProbability::Low),
                record(6, true, BreakoutProbability::Medium),
            ],
        };
        let alerts = scan(&series);
        let kinds: Vec<_> = alerts.iter().map(|a| (a.date.format("%d").to_string(), a.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("02".to_string(), AlertKind::ConsolidationStart),
                ("04".to_string(), AlertKind::BreakoutReady),
                ("06".to_string(), AlertKind::ConsolidationStart),
            ]
        );
        assert_eq!(alerts[1].severity, Severity::Alert);
        assert!(alerts[1].message.contains("HIGH breakout probability"));

        let last = latest(&series).unwrap();
        assert_eq!(last.kind, AlertKind::ConsolidationStart);
    }
}
