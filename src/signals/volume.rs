use crate::models::bar::PriceBar;

/// Relative volume for one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeReading {
    pub avg_volume: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub volume_spike: bool,
}

/// Flags bars whose volume exceeds a multiple of the trailing SMA.
///
/// The average includes the current bar and is undefined until `period`
/// bars exist. A zero average yields no ratio and no spike.
pub struct VolumeAnomalyDetector {
    period: usize,
    spike_multiplier: f64,
}

impl VolumeAnomalyDetector {
    pub fn new(period: usize, spike_multiplier: f64) -> Self {
        Self {
            period: period.max(1),
            spike_multiplier,
        }
    }

    pub fn detect(&self, bars: &[PriceBar]) -> Vec<VolumeReading> {
        let mut out = vec![
            VolumeReading {
                avg_volume: None,
                volume_ratio: None,
                volume_spike: false,
            };
            bars.len()
        ];

        // Each window is summed exactly in integers, so reruns never drift.
        for (offset, window) in bars.windows(self.period).enumerate() {
            let idx = offset + self.period - 1;
            let total: u128 = window.iter().map(|b| b.volume as u128).sum();
            let avg = total as f64 / self.period as f64;
            let ratio = (avg > 0.0).then(|| bars[idx].volume as f64 / avg);

            out[idx] = VolumeReading {
                avg_volume: Some(avg),
                volume_ratio: ratio,
                volume_spike: ratio.is_some_and(|r| r > self.spike_multiplier),
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate};

    fn bars_with_volumes(volumes: &[u64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        volumes
            .iter()
            .enumerate()
            .map(|(i, &v)| PriceBar {
                symbol: "QQQ".into(),
                date: start + Days::new(i as u64),
                open: 10.0,
                high: 11.0,
                low: 9.0,
                close: 10.0,
                volume: v,
            })
            .collect()
    }

    #[test]
    fn test_undefined_before_full_window() {
        let readings = VolumeAnomalyDetector::new(20, 1.5).detect(&bars_with_volumes(&[500; 19]));
        assert!(readings.iter().all(|r| r.volume_ratio.is_none() && !r.volume_spike));
    }

    #[test]
    fn test_average_includes_current_bar() {
        let readings = VolumeAnomalyDetector::new(4, 1.5).detect(&bars_with_volumes(&[100, 100, 100, 500]));
        assert_eq!(readings[3].avg_volume, Some(200.0));
        assert_eq!(readings[3].volume_ratio, Some(2.5));
        assert!(readings[3].volume_spike);
    }

    #[test]
    fn test_ratio_at_multiplier_is_not_a_spike() {
        // Period 2: avg = (100 + 300) / 2 = 200, ratio = 1.5 exactly
        let readings = VolumeAnomalyDetector::new(2, 1.5).detect(&bars_with_volumes(&[100, 300]));
        assert_eq!(readings[1].volume_ratio, Some(1.5));
        assert!(!readings[1].volume_spike);

        let readings = VolumeAnomalyDetector::new(2, 1.5).detect(&bars_with_volumes(&[100, 301]));
        assert!(readings[1].volume_spike);
    }

    #[test]
    fn test_zero_average_reports_no_spike() {
        let readings = VolumeAnomalyDetector::new(3, 1.5).detect(&bars_with_volumes(&[0, 0, 0]));
        assert_eq!(readings[2].avg_volume, Some(0.0));
        assert_eq!(readings[2].volume_ratio, None);
        assert!(!readings[2].volume_spike);
    }
}
