//! Consolidation threshold sweep
//!
//! Replays every history in BARS_DIR with tight-day thresholds 2..=6 and
//! reports how often each flagged consolidation broke out within
//! LOOKFORWARD_BARS bars.
//!
//! Usage:  cargo run --bin backtest

use breakout_watch::config::Config;
use breakout_watch::engine::backtest::run_sweep;
use breakout_watch::feeds::history;

use std::sync::Arc;
use tracing::{error, info};

const THRESHOLDS: std::ops::RangeInclusive<u32> = 2..=6;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load_or_default();
    config.validate()?;

    let mut histories = Vec::new();
    for (path, loaded) in history::load_dir(&config.data.bars_dir)? {
        match loaded {
            Ok(h) => histories.push(h),
            Err(e) => error!("Skipping {}: {e:#}", path.display()),
        }
    }
    anyhow::ensure!(
        !histories.is_empty(),
        "no usable histories in {}",
        config.data.bars_dir.display()
    );
    info!(
        "Backtesting {} symbols, breakout = +{}% within {} bars",
        histories.len(),
        config.backtest.breakout_threshold_pct,
        config.backtest.lookforward_bars
    );

    let configs = THRESHOLDS
        .map(|days| config.engine.with_threshold_days(days))
        .collect();
    let reports = run_sweep(Arc::new(histories), configs, config.backtest.clone()).await;

    for report in reports {
        let report = report?;
        println!("{}", serde_json::to_string(&report)?);

        if report.engine.consolidation_threshold_days == config.engine.consolidation_threshold_days {
            let alerts = &report.alerts;
            info!(
                "Alerts: {} sent, {} broke out, {} broke down, {} pending",
                alerts.total_alerts, alerts.breakouts, alerts.breakdowns, alerts.pending
            );
            match report.suggest_threshold(config.backtest.min_bucket_samples) {
                Some(days) => info!(
                    "Suggested threshold: {days} tight days (currently {})",
                    config.engine.consolidation_threshold_days
                ),
                None => info!("Current threshold looks fine, or too few samples to suggest one"),
            }
        }
    }
    Ok(())
}
