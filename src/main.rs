use breakout_watch::config::Config;
use breakout_watch::engine::batch::BatchAnalyzer;
use breakout_watch::engine::transitions;
use breakout_watch::feeds::history;
use breakout_watch::telemetry::alerts::AlertManager;
use breakout_watch::telemetry::latency::LatencyTracker;

use std::io::Write;
use std::sync::Arc;
use tracing::{error, info, warn};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();
    init_tracing();

    info!("================================================");
    info!("  BREAKOUT WATCH v{}", env!("CARGO_PKG_VERSION"));
    info!("  Daily consolidation and breakout scanner");
    info!("================================================");

    let config = Config::load_or_default();
    config.validate()?;

    let engine = &config.engine;
    info!("--- Engine configuration ---");
    info!("  ATR period:        {}", engine.atr_period);
    info!("  Tight days needed: {}", engine.consolidation_threshold_days);
    info!("  Volume spike:      >{}x {}-bar average", engine.volume_spike_multiplier, engine.volume_avg_period);
    info!("  Lookback:          {}", engine.max_lookback.map_or("all bars".into(), |n| format!("{n} bars")));

    // === Load histories ===
    let latency = Arc::new(LatencyTracker::default());
    let histories = {
        let _timer = latency.start_timer("load");
        let mut histories = Vec::new();
        for (path, loaded) in history::load_dir(&config.data.bars_dir)? {
            match loaded {
                Ok(h) => histories.push(h),
                Err(e) => error!("Skipping {}: {e:#}", path.display()),
            }
        }
        histories
    };
    info!("Loaded {} symbol histories from {}", histories.len(), config.data.bars_dir.display());

    // === Analyse ===
    let batch = BatchAnalyzer::new(Arc::new(config.engine.clone()), latency.clone());
    let report = batch.analyze(histories).await;

    // One JSON line per symbol on stdout; logs go to stderr
    let mut out = std::io::stdout().lock();
    for (symbol, result) in &report.results {
        match result {
            Ok(series) => match series.latest_rated(engine.required_bars()) {
                Ok(record) => writeln!(out, "{}", serde_json::to_string(record)?)?,
                Err(e) => warn!("{e}"),
            },
            Err(e) if e.is_insufficient_history() => warn!("{e}"),
            Err(e) => error!("{symbol}: {e}"),
        }
    }
    out.flush()?;
    drop(out);

    info!("--- Summary ---");
    info!("  Consolidating: {:?}", report.consolidating());
    info!("  HIGH:          {:?}", report.high_probability());
    info!("  Failed:        {}", report.failed().count());

    // === Alerts for the latest transition of each symbol ===
    let alerts = AlertManager::new(config.telemetry.clone());
    let mut sent = 0;
    for series in report.succeeded() {
        if let Some(alert) = transitions::latest(series) {
            if alerts.send(&alert).await {
                sent += 1;
            }
        }
    }
    info!("Sent {sent} alerts");

    latency.log_summary();
    Ok(())
}
