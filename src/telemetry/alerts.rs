use crate::config::TelemetryConfig;
use crate::models::alert::{Alert, AlertKind, Severity};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use dashmap::DashSet;
use tracing::{error, info, warn};

/// Sends alerts via Telegram or Discord webhooks.
pub struct AlertManager {
    config: TelemetryConfig,
    http: reqwest::Client,
    sent: DashSet<(String, AlertKind, NaiveDate)>,
}

impl AlertManager {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            sent: DashSet::new(),
        }
    }

    /// Whether `alert` passes the kind flags and has not been sent before.
    pub fn should_send(&self, alert: &Alert) -> bool {
        let enabled = match alert.kind {
            AlertKind::ConsolidationStart => self.config.alert_on_consolidation,
            AlertKind::BreakoutReady => self.config.alert_on_breakout,
        };
        enabled && !self.sent.contains(&alert.dedup_key())
    }

    /// Log and forward an alert. Returns false when it was filtered out.
    pub async fn send(&self, alert: &Alert) -> bool {
        if !self.should_send(alert) {
            return false;
        }
        // insert() is the atomic claim; a concurrent duplicate loses here
        if !self.sent.insert(alert.dedup_key()) {
            return false;
        }

        match alert.severity {
            Severity::Alert => warn!("ALERT: {alert}"),
            Severity::Info => info!("ALERT: {alert}"),
        }

        if let Err(e) = self.send_telegram(alert).await {
            error!("Telegram alert failed: {e:#}");
        }

        if let Err(e) = self.send_discord(alert).await {
            error!("Discord alert failed: {e:#}");
        }
        true
    }

    /// Send alert to Telegram.
    async fn send_telegram(&self, alert: &Alert) -> Result<()> {
        let (Some(token), Some(chat_id)) = (&self.config.telegram_bot_token, &self.config.telegram_chat_id) else {
            return Ok(()); // Not configured
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": format!("{} *{}*\n{}", icon(alert.kind), alert.title, alert.message),
            "parse_mode": "Markdown"
        });

        self.http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("telegram request")?
            .error_for_status()
            .context("telegram response")?;
        Ok(())
    }

    /// Send alert to Discord.
    async fn send_discord(&self, alert: &Alert) -> Result<()> {
        let Some(webhook_url) = &self.config.discord_webhook_url else {
            return Ok(());
        };

        let body = serde_json::json!({
            "content": format!("{} **{}**: {}", icon(alert.kind), alert.title, alert.message)
        });

        self.http
            .post(webhook_url)
            .json(&body)
            .send()
            .await
            .context("discord request")?
            .error_for_status()
            .context("discord response")?;
        Ok(())
    }
}

fn icon(kind: AlertKind) -> &'static str {
    match kind {
        AlertKind::ConsolidationStart => "📊",
        AlertKind::BreakoutReady => "🚀",
    }
}
