use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Breakout rating for one bar.
///
/// `InsufficientData` is a separate variant so callers never mistake a
/// warming-up baseline for a genuine `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakoutProbability {
    InsufficientData,
    Low,
    Medium,
    High,
}

impl BreakoutProbability {
    pub fn is_rated(&self) -> bool {
        !matches!(self, BreakoutProbability::InsufficientData)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BreakoutProbability::InsufficientData => "INSUFFICIENT_DATA",
            BreakoutProbability::Low => "LOW",
            BreakoutProbability::Medium => "MEDIUM",
            BreakoutProbability::High => "HIGH",
        }
    }
}

impl std::fmt::Display for BreakoutProbability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-symbol state machine view of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsolidationState {
    NotConsolidating,
    ConsolidatingMedium,
    ConsolidatingHigh,
}

/// Engine output for one (symbol, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: f64,
    pub volume: u64,
    pub true_range: Option<f64>,
    pub atr: Option<f64>,
    pub daily_range: f64,
    pub consecutive_tight_days: u32,
    pub avg_volume: Option<f64>,
    pub volume_ratio: Option<f64>, // current / trailing average
    pub is_consolidating: bool,
    pub volume_spike: bool,
    pub breakout_probability: BreakoutProbability,
    pub confidence_score: Option<u8>,      // 0-100, rated bars only
    pub range_tightness_pct: Option<f64>, // how far below ATR today's range sits
}

impl AnalysisRecord {
    pub fn consolidation_state(&self) -> ConsolidationState {
        match (self.is_consolidating, self.breakout_probability) {
            (true, BreakoutProbability::High) => ConsolidationState::ConsolidatingHigh,
            (true, _) => ConsolidationState::ConsolidatingMedium,
            (false, _) => ConsolidationState::NotConsolidating,
        }
    }

    pub fn is_high(&self) -> bool {
        self.breakout_probability == BreakoutProbability::High
    }
}

/// All records for one symbol, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesAnalysis {
    pub symbol: String,
    pub records: Vec<AnalysisRecord>,
}

impl SeriesAnalysis {
    pub fn latest(&self) -> Option<&AnalysisRecord> {
        self.records.last()
    }

    /// Latest record, or `InsufficientHistory` when its baselines are not ready.
    pub fn latest_rated(&self, required: usize) -> Result<&AnalysisRecord, AnalysisError> {
        match self.records.last() {
            Some(record) if record.breakout_probability.is_rated() => Ok(record),
            _ => Err(AnalysisError::InsufficientHistory {
                symbol: self.symbol.clone(),
                bars: self.records.len(),
                required,
            }),
        }
    }

    pub fn record_on(&self, date: NaiveDate) -> Option<&AnalysisRecord> {
        self.records
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|idx| &self.records[idx])
    }

    /// Latest record and the one before it, for transition checks.
    pub fn last_pair(&self) -> Option<(Option<&AnalysisRecord>, &AnalysisRecord)> {
        let (current, rest) = self.records.split_last()?;
        Some((rest.last(), current))
    }
}
