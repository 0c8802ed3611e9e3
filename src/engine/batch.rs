use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::AnalysisError;
use crate::feeds::history::SymbolHistory;
use crate::models::analysis::{BreakoutProbability, SeriesAnalysis};
use crate::telemetry::latency::LatencyTracker;

use super::analyzer::ConsolidationAnalyzer;

/// Per-symbol outcomes of one batch run, keyed by symbol.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: BTreeMap<String, Result<SeriesAnalysis, AnalysisError>>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &SeriesAnalysis> {
        self.results.values().filter_map(|r| r.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &AnalysisError> {
        self.results.values().filter_map(|r| r.as_ref().err())
    }

    /// Symbols whose latest bar is consolidating.
    pub fn consolidating(&self) -> Vec<&str> {
        self.succeeded()
            .filter(|s| s.latest().is_some_and(|r| r.is_consolidating))
            .map(|s| s.symbol.as_str())
            .collect()
    }

    /// Symbols whose latest bar is rated HIGH.
    pub fn high_probability(&self) -> Vec<&str> {
        self.succeeded()
            .filter(|s| {
                s.latest()
                    .is_some_and(|r| r.breakout_probability == BreakoutProbability::High)
            })
            .map(|s| s.symbol.as_str())
            .collect()
    }
}

/// Analyses many symbols concurrently.
///
/// Each symbol runs on the blocking pool; a semaphore caps how many run
/// at once. Symbols share only the read-only config, so completion order
/// never changes any result.
pub struct BatchAnalyzer {
    config: Arc<EngineConfig>,
    permits: Arc<Semaphore>,
    timings: Arc<LatencyTracker>,
}

impl BatchAnalyzer {
    pub fn new(config: Arc<EngineConfig>, timings: Arc<LatencyTracker>) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::with_concurrency(config, timings, workers)
    }

    pub fn with_concurrency(config: Arc<EngineConfig>, timings: Arc<LatencyTracker>, workers: usize) -> Self {
        Self {
            config,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timings,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn analyze(&self, histories: Vec<SymbolHistory>) -> BatchReport {
        let started = Instant::now();
        let total = histories.len();
        let mut tasks = JoinSet::new();
        let mut report = BatchReport::default();

        // Two histories under one symbol would overwrite each other in the report
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for history in &histories {
            *counts.entry(history.symbol.as_str()).or_default() += 1;
        }
        let duplicates: HashMap<String, usize> = counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(symbol, n)| (symbol.to_string(), n))
            .collect();
        for (symbol, &n) in &duplicates {
            warn!("{symbol} appears {n} times in the batch; rejecting all of its histories");
            report.results.insert(
                symbol.clone(),
                Err(AnalysisError::DuplicateSymbol {
                    symbol: symbol.clone(),
                    histories: n,
                }),
            );
        }

        for history in histories.into_iter().filter(|h| !duplicates.contains_key(&h.symbol)) {
            let config = self.config.clone();
            let permits = self.permits.clone();
            let timings = self.timings.clone();

            tasks.spawn(async move {
                let symbol = history.symbol.clone();
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return (
                            symbol.clone(),
                            Err(AnalysisError::TaskFailed {
                                symbol,
                                reason: e.to_string(),
                            }),
                        )
                    }
                };

                let outcome = tokio::task::spawn_blocking(move || {
                    let _timer = timings.start_timer("analyze_series");
                    ConsolidationAnalyzer::new(&config).analyze(&history.symbol, &history.bars)
                })
                .await;

                let result = match outcome {
                    Ok(result) => result,
                    Err(e) => Err(AnalysisError::TaskFailed {
                        symbol: symbol.clone(),
                        reason: e.to_string(),
                    }),
                };
                (symbol, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, result)) => {
                    if let Err(e) = &result {
                        error!("Analysis failed for {symbol}: {e}");
                    }
                    report.results.insert(symbol, result);
                }
                // The outer task only awaits; it fails solely on runtime shutdown
                Err(e) => error!("Batch task aborted: {e}"),
            }
        }

        self.timings.record("batch", started.elapsed());
        info!(
            "Batch analysed {} symbols ({} ok, {} failed) in {:.1}ms",
            total,
            report.succeeded().count(),
            report.failed().count(),
            started.elapsed().as_secs_f64() * 1000.0,
        );
        report
    }
}
