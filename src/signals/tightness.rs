/// Tightness of one bar relative to its ATR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TightnessReading {
    pub is_tight: Option<bool>, // None while ATR is undefined
    pub consecutive_tight_days: u32,
    pub is_consolidating: bool,
}

/// Counts consecutive bars whose range sits at or below ATR.
///
/// The streak is rebuilt from the first bar of the window on every call;
/// no prior streak is carried in, so corrected history cannot leave a stale
/// counter behind.
pub struct TightnessClassifier {
    threshold_days: u32,
}

impl TightnessClassifier {
    pub fn new(threshold_days: u32) -> Self {
        Self { threshold_days }
    }

    pub fn classify(&self, daily_range: &[f64], atr: &[Option<f64>]) -> Vec<TightnessReading> {
        let mut streak = 0u32;
        daily_range
            .iter()
            .zip(atr)
            .map(|(&range, atr)| {
                let is_tight = atr.map(|atr| range <= atr);
                streak = match is_tight {
                    Some(true) => streak + 1,
                    // A bar without ATR can never extend a streak
                    _ => 0,
                };
                TightnessReading {
                    is_tight,
                    consecutive_tight_days: streak,
                    is_consolidating: streak >= self.threshold_days,
                }
            })
            .collect()
    }
}
