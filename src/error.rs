use chrono::NaiveDate;
use thiserror::Error;

/// Per-symbol failures raised by the consolidation engine.
///
/// None of these abort a batch: each symbol's result is independent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("{symbol}: insufficient history, have {bars} bars but need {required}")]
    InsufficientHistory {
        symbol: String,
        bars: usize,
        required: usize,
    },

    #[error("{symbol} {date}: malformed bar: {defect}")]
    MalformedBar {
        symbol: String,
        date: NaiveDate,
        defect: BarDefect,
    },

    #[error("{symbol}: bar dated {date} does not follow {previous}")]
    OutOfOrder {
        symbol: String,
        date: NaiveDate,
        previous: NaiveDate,
    },

    #[error("bar for {found} on {date} found in {expected} series")]
    SymbolMismatch {
        expected: String,
        found: String,
        date: NaiveDate,
    },

    #[error("analysis task for {symbol} failed: {reason}")]
    TaskFailed { symbol: String, reason: String },

    #[error("{symbol}: {histories} histories submitted in one batch")]
    DuplicateSymbol { symbol: String, histories: usize },
}

impl AnalysisError {
    pub fn symbol(&self) -> &str {
        match self {
            AnalysisError::InsufficientHistory { symbol, .. }
            | AnalysisError::MalformedBar { symbol, .. }
            | AnalysisError::OutOfOrder { symbol, .. }
            | AnalysisError::TaskFailed { symbol, .. }
            | AnalysisError::DuplicateSymbol { symbol, .. } => symbol,
            AnalysisError::SymbolMismatch { expected, .. } => expected,
        }
    }

    /// Too little history is an expected state for new listings, not a data fault.
    pub fn is_insufficient_history(&self) -> bool {
        matches!(self, AnalysisError::InsufficientHistory { .. })
    }
}

/// Reason a single OHLCV bar was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BarDefect {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("{0} is not a finite number")]
    NonFinite(&'static str),

    #[error("{0} must be positive")]
    NonPositive(&'static str),

    #[error("high is below low")]
    HighBelowLow,

    #[error("open lies outside the high-low range")]
    OpenOutsideRange,

    #[error("close lies outside the high-low range")]
    CloseOutsideRange,
}
