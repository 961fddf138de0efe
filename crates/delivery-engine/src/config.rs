use std::time::Duration;

use crate::error::DeliveryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpTls {
    Tls,
    StartTls,
    None,
}

/// Transport and policy-default configuration. Missing SMTP fields disable
/// that channel rather than failing startup; a deployment may run
/// Discord-only. The policy defaults mirror `fx-config::Settings`'
/// `dedup_window`/`default_daily_quota`/`default_cooldown_minutes` so this
/// crate is independently configurable when exercised outside the
/// orchestrator (e.g. in its own tests).
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_tls: SmtpTls,
    pub discord_webhook_url: Option<String>,
    pub retry_base_delay_ms: u64,
    pub retry_max_attempts: u32,
    pub dedup_window: Duration,
    pub default_daily_quota: u32,
    pub default_cooldown_minutes: i64,
}

impl DeliveryConfig {
    pub fn from_env() -> Result<Self, DeliveryError> {
        let smtp_tls = match std::env::var("SMTP_TLS").ok().as_deref() {
            Some("starttls") => SmtpTls::StartTls,
            Some("none") => SmtpTls::None,
            _ => SmtpTls::Tls,
        };

        let smtp_port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(587);

        Ok(Self {
            smtp_host: std::env::var("SMTP_HOST").ok(),
            smtp_port,
            smtp_username: std::env::var("SMTP_USERNAME").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
            smtp_from: std::env::var("SMTP_FROM_ADDRESS").ok(),
            smtp_tls,
            discord_webhook_url: std::env::var("DISCORD_WEBHOOK_URL").ok(),
            retry_base_delay_ms: std::env::var("DELIVERY_RETRY_BASE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            retry_max_attempts: std::env::var("DELIVERY_RETRY_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            dedup_window: Duration::from_secs(
                std::env::var("DEDUP_WINDOW_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30 * 60),
            ),
            default_daily_quota: std::env::var("DEFAULT_DAILY_QUOTA")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            default_cooldown_minutes: std::env::var("DEFAULT_COOLDOWN_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
        })
    }
}
