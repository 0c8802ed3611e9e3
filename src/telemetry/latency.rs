use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::info;

/// Rolling duration samples per analysis stage, shared across batch tasks.
pub struct LatencyTracker {
    samples: DashMap<String, VecDeque<Duration>>,
    max_samples: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub stage: String,
    pub samples: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: DashMap::new(),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&self, stage: &str, duration: Duration) {
        let mut window = self.samples.entry(stage.to_string()).or_default();
        if window.len() >= self.max_samples {
            window.pop_front();
        }
        window.push_back(duration);
    }

    /// Timer that records into `stage` when dropped.
    pub fn start_timer(&self, stage: &str) -> StageTimer<'_> {
        StageTimer {
            stage: stage.to_string(),
            start: Instant::now(),
            tracker: self,
        }
    }

    pub fn summary(&self, stage: &str) -> Option<StageSummary> {
        let window = self.samples.get(stage)?;
        let mut sorted: Vec<Duration> = window.iter().copied().collect();
        drop(window);
        if sorted.is_empty() {
            return None;
        }
        sorted.sort();

        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        Some(StageSummary {
            stage: stage.to_string(),
            samples: sorted.len(),
            p50_ms: ms(nearest_rank(&sorted, 0.50)),
            p95_ms: ms(nearest_rank(&sorted, 0.95)),
            max_ms: ms(sorted[sorted.len() - 1]),
        })
    }

    /// Summaries for every stage, sorted by stage name.
    pub fn summaries(&self) -> Vec<StageSummary> {
        let mut stages: Vec<String> = self.samples.iter().map(|e| e.key().clone()).collect();
        stages.sort();
        stages.iter().filter_map(|s| self.summary(s)).collect()
    }

    pub fn log_summary(&self) {
        for s in self.summaries() {
            info!(
                "Timing [{}]: p50={:.2}ms p95={:.2}ms max={:.2}ms samples={}",
                s.stage, s.p50_ms, s.p95_ms, s.max_ms, s.samples
            );
        }
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(1_000)
    }
}

fn nearest_rank(sorted: &[Duration], q: f64) -> Duration {
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

pub struct StageTimer<'a> {
    stage: String,
    start: Instant,
    tracker: &'a LatencyTracker,
}

impl Drop for StageTimer<'_> {
    fn drop(&mut self) {
        self.tracker.record(&self.stage, self.start.elapsed());
    }
}
