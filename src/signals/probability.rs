use crate::config::{EngineConfig, ScoreWeights};
use crate::models::analysis::BreakoutProbability;

/// Inputs the scorer needs for a single bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreInput {
    pub atr: Option<f64>,
    pub daily_range: f64,
    pub avg_volume: Option<f64>,
    pub consecutive_tight_days: u32,
    pub volume_spike: bool,
}

/// Scorer output for a single bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub probability: BreakoutProbability,
    pub confidence: Option<u8>,
    pub range_tightness_pct: Option<f64>,
}

struct Rule {
    outcome: BreakoutProbability,
    applies: fn(&ScoreInput, u32) -> bool,
}

fn missing_baseline(input: &ScoreInput, _threshold: u32) -> bool {
    input.atr.is_none() || input.avg_volume.is_none()
}

fn short_streak(input: &ScoreInput, threshold: u32) -> bool {
    input.consecutive_tight_days < threshold
}

fn quiet_volume(input: &ScoreInput, _threshold: u32) -> bool {
    !input.volume_spike
}

fn always(_input: &ScoreInput, _threshold: u32) -> bool {
    true
}

/// Classification table, evaluated top-down; the first matching guard wins.
const RULES: [Rule; 4] = [
    Rule {
        outcome: BreakoutProbability::InsufficientData,
        applies: missing_baseline,
    },
    Rule {
        outcome: BreakoutProbability::Low,
        applies: short_streak,
    },
    Rule {
        outcome: BreakoutProbability::Medium,
        applies: quiet_volume,
    },
    Rule {
        outcome: BreakoutProbability::High,
        applies: always,
    },
];

/// Combines streak length, volume anomaly and range tightness into a rating.
pub struct BreakoutScorer {
    threshold_days: u32,
    weights: ScoreWeights,
}

impl BreakoutScorer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            threshold_days: config.consolidation_threshold_days,
            weights: config.score.clone(),
        }
    }

    pub fn classify(&self, input: &ScoreInput) -> BreakoutProbability {
        RULES
            .iter()
            .find(|rule| (rule.applies)(input, self.threshold_days))
            .map(|rule| rule.outcome)
            .unwrap_or(BreakoutProbability::InsufficientData)
    }

    /// `(1 - range / ATR) * 100`; negative when the bar was wider than ATR.
    pub fn range_tightness_pct(daily_range: f64, atr: Option<f64>) -> Option<f64> {
        let atr = atr.filter(|a| *a > 0.0)?;
        Some((1.0 - daily_range / atr) * 100.0)
    }

    /// 0-100 score: capped tight-day points, a flat spike bonus, and points
    /// proportional to how far below ATR the bar closed its range.
    pub fn confidence(&self, tight_days: u32, volume_spike: bool, range_tightness_pct: Option<f64>) -> u8 {
        let w = &self.weights;
        // Saturating: weights from the library API are not validated
        let day_points = tight_days.min(w.tight_day_cap).saturating_mul(w.tight_day_points);
        let spike_points = if volume_spike { w.volume_spike_bonus } else { 0 };
        let tightness_points = range_tightness_pct
            .map(|pct| pct.clamp(0.0, 100.0) / 100.0 * w.tightness_max_points)
            .unwrap_or(0.0);

        let total = day_points.saturating_add(spike_points) as f64 + tightness_points;
        total.round().clamp(0.0, 100.0) as u8
    }

    pub fn score(&self, input: &ScoreInput) -> Score {
        let probability = self.classify(input);
        let range_tightness_pct = Self::range_tightness_pct(input.daily_range, input.atr);
        let confidence = probability.is_rated().then(|| {
            self.confidence(input.consecutive_tight_days, input.volume_spike, range_tightness_pct)
        });
        Score {
            probability,
            confidence,
            range_tightness_pct,
        }
    }
}
