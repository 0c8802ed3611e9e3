use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, BarDefect};

/// One trading day of OHLCV data for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PriceBar {
    pub fn daily_range(&self) -> f64 {
        self.high - self.low
    }

    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let hl = self.daily_range();
        match prev_close {
            Some(pc) => {
                let hc = (self.high - pc).abs();
                let lc = (self.low - pc).abs();
                hl.max(hc).max(lc)
            }
            None => hl,
        }
    }

    /// Check price sanity. Volume is unsigned, so only prices are inspected.
    pub fn validate(&self) -> Result<(), BarDefect> {
        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !value.is_finite() {
                return Err(BarDefect::NonFinite(name));
            }
            if value <= 0.0 {
                return Err(BarDefect::NonPositive(name));
            }
        }
        if self.high < self.low {
            return Err(BarDefect::HighBelowLow);
        }
        if self.open < self.low || self.open > self.high {
            return Err(BarDefect::OpenOutsideRange);
        }
        if self.close < self.low || self.close > self.high {
            return Err(BarDefect::CloseOutsideRange);
        }
        Ok(())
    }
}

/// Feed-facing bar where any OHLCV field may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
}

impl TryFrom<RawBar> for PriceBar {
    type Error = AnalysisError;

    fn try_from(raw: RawBar) -> Result<Self, Self::Error> {
        let malformed = |defect| AnalysisError::MalformedBar {
            symbol: raw.symbol.clone(),
            date: raw.date,
            defect,
        };

        let bar = PriceBar {
            open: raw.open.ok_or_else(|| malformed(BarDefect::MissingField("open")))?,
            high: raw.high.ok_or_else(|| malformed(BarDefect::MissingField("high")))?,
            low: raw.low.ok_or_else(|| malformed(BarDefect::MissingField("low")))?,
            close: raw.close.ok_or_else(|| malformed(BarDefect::MissingField("close")))?,
            volume: raw.volume.ok_or_else(|| malformed(BarDefect::MissingField("volume")))?,
            symbol: raw.symbol.clone(),
            date: raw.date,
        };
        bar.validate().map_err(malformed)?;
        Ok(bar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> PriceBar {
        PriceBar {
            symbol: "MSFT".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn test_true_range_uses_gap_from_previous_close() {
        let b = bar(104.0, 105.0, 103.0, 104.0);
        assert_eq!(b.true_range(None), 2.0);
        // Gap up: previous close far below today's low
        assert_eq!(b.true_range(Some(100.0)), 5.0);
        // Gap down: previous close far above today's high
        assert_eq!(b.true_range(Some(108.0)), 5.0);
        // Inside the range: plain high - low
        assert_eq!(b.true_range(Some(104.0)), 2.0);
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let b = bar(10.0, 9.0, 11.0, 10.0);
        assert_eq!(b.validate(), Err(BarDefect::HighBelowLow));
    }

    #[test]
    fn test_validate_rejects_non_positive_and_nan() {
        assert_eq!(bar(0.0, 1.0, 0.0, 0.5).validate(), Err(BarDefect::NonPositive("open")));
        assert_eq!(
            bar(1.0, f64::NAN, 0.5, 0.8).validate(),
            Err(BarDefect::NonFinite("high"))
        );
    }

    #[test]
    fn test_validate_rejects_close_outside_range() {
        assert_eq!(
            bar(10.0, 11.0, 9.0, 12.0).validate(),
            Err(BarDefect::CloseOutsideRange)
        );
        assert_eq!(
            bar(8.0, 11.0, 9.0, 10.0).validate(),
            Err(BarDefect::OpenOutsideRange)
        );
    }

    #[test]
    fn test_raw_bar_missing_volume_is_tagged() {
        let raw: RawBar = serde_json::from_str(
            r#"{"symbol":"TSLA","date":"2024-02-01","open":1.0,"high":2.0,"low":0.5,"close":1.5}"#,
        )
        .unwrap();
        let err = PriceBar::try_from(raw).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::MalformedBar {
                symbol: "TSLA".into(),
                date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                defect: BarDefect::MissingField("volume"),
            }
        );
    }

    #[test]
    fn test_raw_bar_converts_when_complete() {
        let raw: RawBar = serde_json::from_str(
            r#"{"symbol":"TSLA","date":"2024-02-01","open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":300}"#,
        )
        .unwrap();
        let bar = PriceBar::try_from(raw).unwrap();
        assert_eq!(bar.volume, 300);
        assert_eq!(bar.daily_range(), 1.5);
    }
}
