use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::analysis::{AnalysisRecord, BreakoutProbability};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    ConsolidationStart,
    BreakoutReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Alert,
}

impl AlertKind {
    pub fn severity(&self) -> Severity {
        match self {
            AlertKind::ConsolidationStart => Severity::Info,
            AlertKind::BreakoutReady => Severity::Alert,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::ConsolidationStart => "Consolidation Started",
            AlertKind::BreakoutReady => "Breakout Ready",
        }
    }
}

/// User-facing notification derived from a record transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub symbol: String,
    pub date: NaiveDate,
    pub kind: AlertKind,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub probability: BreakoutProbability,
    pub consecutive_tight_days: u32,
    pub volume_ratio: Option<f64>,
    pub atr: Option<f64>,
    pub close: f64,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn from_record(kind: AlertKind, record: &AnalysisRecord) -> Self {
        let symbol = &record.symbol;
        let atr = record.atr.unwrap_or(0.0);
        let price = record.close;

        let (title, message) = match kind {
            AlertKind::ConsolidationStart => (
                format!("{symbol} Consolidating"),
                format!(
                    "{symbol} has entered consolidation. {} consecutive days with daily \
                     range at or below ATR (${atr:.2}). Current price: ${price:.2}. \
                     Watch for volume increase.",
                    record.consecutive_tight_days
                ),
            ),
            AlertKind::BreakoutReady => (
                format!("{symbol} Breakout Ready!"),
                format!(
                    "BREAKOUT ALERT: {symbol} is showing HIGH breakout probability! \
                     {} tight days with volume spike detected. Volume is {:.1}x average. \
                     Current price: ${price:.2}. ATR: ${atr:.2}.",
                    record.consecutive_tight_days,
                    record.volume_ratio.unwrap_or(0.0)
                ),
            ),
        };

        Self {
            id: Uuid::new_v4(),
            symbol: symbol.clone(),
            date: record.date,
            kind,
            severity: kind.severity(),
            title,
            message,
            probability: record.breakout_probability,
            consecutive_tight_days: record.consecutive_tight_days,
            volume_ratio: record.volume_ratio,
            atr: record.atr,
            close: record.close,
            created_at: Utc::now(),
        }
    }

    /// Key used to drop repeat alerts when a day is re-analysed.
    pub fn dedup_key(&self) -> (String, AlertKind, NaiveDate) {
        (self.symbol.clone(), self.kind, self.date)
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} {}: {}", self.kind.label(), self.date, self.title, self.message)
    }
}
