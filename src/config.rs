use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub backtest: BacktestConfig,
    pub telemetry: TelemetryConfig,
    pub data: DataConfig,
}

/// Tunable parameters of the consolidation engine.
///
/// Passed by reference into every analysis entry point so that several
/// configurations can be evaluated side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub atr_period: usize,                // Wilder ATR period (e.g. 14)
    pub consolidation_threshold_days: u32, // Tight days needed to call a consolidation (e.g. 3)
    pub volume_spike_multiplier: f64,     // RVOL above this = spike (e.g. 1.5)
    pub volume_avg_period: usize,         // Volume SMA window in bars (e.g. 20)
    pub max_lookback: Option<usize>,      // Analyse only the trailing N bars
    pub score: ScoreWeights,
}

/// Weights of the 0-100 confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub tight_day_points: u32,
    pub tight_day_cap: u32,
    pub volume_spike_bonus: u32,
    pub tightness_max_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub breakout_threshold_pct: f64, // Max gain that counts as a breakout (e.g. 2.0)
    pub lookforward_bars: usize,     // Bars inspected after a pattern starts (e.g. 10)
    pub min_bucket_samples: usize,   // Evaluated patterns needed before suggesting a threshold
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub alert_on_consolidation: bool,
    pub alert_on_breakout: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub bars_dir: PathBuf,
}

impl EngineConfig {
    /// Bars needed before every baseline of the latest bar is defined.
    pub fn required_bars(&self) -> usize {
        (self.atr_period + 1).max(self.volume_avg_period)
    }

    pub fn with_threshold_days(&self, days: u32) -> Self {
        Self {
            consolidation_threshold_days: days,
            ..self.clone()
        }
    }
}

impl ScoreWeights {
    pub fn max_score(&self) -> f64 {
        self.tight_day_points
            .saturating_mul(self.tight_day_cap)
            .saturating_add(self.volume_spike_bonus) as f64
            + self.tightness_max_points
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            consolidation_threshold_days: 3,
            volume_spike_multiplier: 1.5,
            volume_avg_period: 20,
            max_lookback: None,
            score: ScoreWeights::default(),
        }
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            tight_day_points: 8,
            tight_day_cap: 5,
            volume_spike_bonus: 30,
            tightness_max_points: 30.0,
        }
    }
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            breakout_threshold_pct: 2.0,
            lookforward_bars: 10,
            min_bucket_samples: 5,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            discord_webhook_url: None,
            alert_on_consolidation: true,
            alert_on_breakout: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            backtest: BacktestConfig::default(),
            telemetry: TelemetryConfig::default(),
            data: DataConfig {
                bars_dir: PathBuf::from("data/bars"),
            },
        }
    }
}

/// Parse an env var, keeping the default (with a warning) when it is malformed.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {key}={raw:?}: not a valid value, keeping default");
            None
        }
    }
}

/// Read a non-empty env var that is not a template placeholder.
fn env_secret(key: &str, placeholder: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty() && v != placeholder)
}

impl Config {
    /// Load configuration from environment variables (.env file) with defaults.
    ///
    /// Engine env vars:
    ///   ATR_PERIOD, CONSOLIDATION_THRESHOLD_DAYS, VOLUME_SPIKE_MULTIPLIER,
    ///   VOLUME_AVG_PERIOD, MAX_LOOKBACK_BARS
    ///
    /// Backtest env vars:
    ///   BREAKOUT_THRESHOLD_PCT, LOOKFORWARD_BARS
    ///
    /// Other:
    ///   BARS_DIR: directory of per-symbol JSON histories (default: data/bars)
    ///   TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, DISCORD_WEBHOOK_URL: alert channels
    ///   RUST_LOG: log level (default: info)
    pub fn load_or_default() -> Self {
        let _ = dotenv::dotenv();

        let mut config = Self::default();

        if let Some(period) = env_parse("ATR_PERIOD") {
            config.engine.atr_period = period;
        }
        if let Some(days) = env_parse("CONSOLIDATION_THRESHOLD_DAYS") {
            config.engine.consolidation_threshold_days = days;
        }
        if let Some(mult) = env_parse("VOLUME_SPIKE_MULTIPLIER") {
            config.engine.volume_spike_multiplier = mult;
        }
        if let Some(period) = env_parse("VOLUME_AVG_PERIOD") {
            config.engine.volume_avg_period = period;
        }
        if let Some(lookback) = env_parse("MAX_LOOKBACK_BARS") {
            config.engine.max_lookback = Some(lookback);
        }

        if let Some(pct) = env_parse("BREAKOUT_THRESHOLD_PCT") {
            config.backtest.breakout_threshold_pct = pct;
        }
        if let Some(bars) = env_parse("LOOKFORWARD_BARS") {
            config.backtest.lookforward_bars = bars;
        }

        if let Ok(dir) = std::env::var("BARS_DIR") {
            if !dir.is_empty() {
                config.data.bars_dir = PathBuf::from(dir);
            }
        }

        config.telemetry.telegram_bot_token = env_secret("TELEGRAM_BOT_TOKEN", "your_bot_token");
        config.telemetry.telegram_chat_id = env_secret("TELEGRAM_CHAT_ID", "your_chat_id");
        config.telemetry.discord_webhook_url = env_secret("DISCORD_WEBHOOK_URL", "your_webhook_url");

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.telemetry.log_level = level;
        }

        config
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.engine.validate()?;

        let bt = &self.backtest;
        anyhow::ensure!(
            bt.breakout_threshold_pct > 0.0,
            "breakout_threshold_pct must be positive, got {}",
            bt.breakout_threshold_pct
        );
        anyhow::ensure!(bt.lookforward_bars >= 1, "lookforward_bars must be at least 1");

        if let Some(webhook) = &self.telemetry.discord_webhook_url {
            url::Url::parse(webhook)
                .map_err(|e| anyhow::anyhow!("DISCORD_WEBHOOK_URL is not a valid URL: {e}"))?;
        }
        if self.telemetry.telegram_bot_token.is_some() != self.telemetry.telegram_chat_id.is_some() {
            tracing::warn!("Telegram alerts need both TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID");
        }
        Ok(())
    }
}

impl EngineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.atr_period >= 1, "atr_period must be at least 1");
        anyhow::ensure!(self.volume_avg_period >= 1, "volume_avg_period must be at least 1");
        anyhow::ensure!(
            self.consolidation_threshold_days >= 1,
            "consolidation_threshold_days must be at least 1"
        );
        anyhow::ensure!(
            self.volume_spike_multiplier.is_finite() && self.volume_spike_multiplier > 0.0,
            "volume_spike_multiplier must be a positive number, got {}",
            self.volume_spike_multiplier
        );
        if let Some(lookback) = self.max_lookback {
            anyhow::ensure!(
                lookback >= self.required_bars(),
                "max_lookback {lookback} is shorter than the {} bars the baselines need",
                self.required_bars()
            );
        }

        let score = &self.score;
        anyhow::ensure!(
            score.tight_day_points > 0 && score.tight_day_cap > 0 && score.volume_spike_bonus > 0,
            "score weights for tight days and volume spikes must be positive"
        );
        anyhow::ensure!(
            score.tightness_max_points >= 0.0,
            "tightness_max_points must not be negative"
        );
        anyhow::ensure!(
            score.max_score() <= 100.0,
            "score weights can reach {:.1}, which exceeds 100",
            score.max_score()
        );
        Ok(())
    }
}
