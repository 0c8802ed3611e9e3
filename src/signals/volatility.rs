use crate::models::bar::PriceBar;

/// Per-bar range and volatility baseline for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilitySeries {
    pub true_range: Vec<Option<f64>>,
    pub atr: Vec<Option<f64>>,
    pub daily_range: Vec<f64>,
}

/// Wilder ATR over an ordered bar slice.
///
/// Bar 0 has no true range (no previous close). The seed is the simple
/// mean of `true_range[1..=period]`, assigned to bar `period`; later bars
/// use `atr += (tr - atr) / period`.
pub struct VolatilityCalculator {
    period: usize,
}

impl VolatilityCalculator {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn true_ranges(bars: &[PriceBar]) -> Vec<Option<f64>> {
        let mut out = Vec::with_capacity(bars.len());
        for (i, bar) in bars.iter().enumerate() {
            if i == 0 {
                out.push(None);
            } else {
                out.push(Some(bar.true_range(Some(bars[i - 1].close))));
            }
        }
        out
    }

    pub fn atr(&self, true_range: &[Option<f64>]) -> Vec<Option<f64>> {
        let n = self.period;
        let mut out = vec![None; true_range.len()];
        if true_range.len() <= n {
            return out;
        }

        // Every index >= 1 carries a true range, so the seed window is complete.
        let seed: f64 = true_range[1..=n].iter().flatten().sum::<f64>() / n as f64;
        out[n] = Some(seed);

        let mut atr = seed;
        for i in (n + 1)..true_range.len() {
            if let Some(tr) = true_range[i] {
                atr += (tr - atr) / n as f64;
            }
            out[i] = Some(atr);
        }
        out
    }

    pub fn compute(&self, bars: &[PriceBar]) -> VolatilitySeries {
        let true_range = Self::true_ranges(bars);
        let atr = self.atr(&true_range);
        let daily_range = bars.iter().map(PriceBar::daily_range).collect();
        VolatilitySeries {
            true_range,
            atr,
            daily_range,
        }
    }
}
