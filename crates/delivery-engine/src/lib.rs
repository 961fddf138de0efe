//! C4 Delivery Engine: consumes `signal.changed` events, filters recipients
//! by subscription/policy/cooldown/quota/dedup, and hands formatted
//! payloads to whichever transports are configured.

pub mod channel;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod payload;
pub mod smtp;

pub use channel::{DeliverAck, DiscordWebhookChannel, NotificationChannel};
pub use config::{DeliveryConfig, SmtpTls};
pub use error::DeliveryError;
pub use payload::DeliveryPayload;
pub use smtp::SmtpChannel;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fx_core::{
    NotificationLevel, NotificationReceipt, NotificationStore, ReceiptSubject, Signal, SignalChange,
    SignalStore, Subscription, SubscriptionStore, UserPolicyStore,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Builds the configured transport set from `DeliveryConfig`. An SMTP
/// transport is added only when `smtp_host`/`smtp_from` are present; a
/// Discord transport only when `discord_webhook_url` is set. A deployment
/// with neither still runs — eligibility and cooldown bookkeeping happen
/// regardless of whether anything can actually be delivered.
pub fn build_channels(config: &DeliveryConfig) -> Vec<Arc<dyn NotificationChannel>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

    if config.smtp_host.is_some() && config.smtp_from.is_some() {
        match SmtpChannel::new(config) {
            Ok(smtp) => channels.push(Arc::new(smtp)),
            Err(err) => tracing::warn!(%err, "failed to initialize SMTP channel"),
        }
    }

    if let Some(webhook_url) = config.discord_webhook_url.clone() {
        channels.push(Arc::new(DiscordWebhookChannel {
            webhook_url,
            client: reqwest::Client::new(),
        }));
    }

    if channels.is_empty() {
        tracing::info!("no delivery transports configured (set SMTP_HOST or DISCORD_WEBHOOK_URL)");
    }

    channels
}

pub struct DeliveryEngine {
    subscriptions: Arc<dyn SubscriptionStore>,
    policies: Arc<dyn UserPolicyStore>,
    notifications: Arc<dyn NotificationStore>,
    signals: Arc<dyn SignalStore>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    config: DeliveryConfig,
}

impl DeliveryEngine {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        policies: Arc<dyn UserPolicyStore>,
        notifications: Arc<dyn NotificationStore>,
        signals: Arc<dyn SignalStore>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            subscriptions,
            policies,
            notifications,
            signals,
            channels,
            config,
        }
    }

    /// Drains `signal.changed` events until `shutdown` fires. Each event
    /// fans out to its subscribers as independent spawned tasks so one
    /// slow/unreachable recipient never delays the rest.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<SignalChange>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("delivery engine shutting down");
                    return;
                }
                received = events.recv() => {
                    match received {
                        Ok(change) => {
                            let this = self.clone();
                            tokio::spawn(async move { this.handle_change(change).await });
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "delivery engine lagged behind signal.changed stream");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("signal.changed stream closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle_change(&self, change: SignalChange) {
        let signal = match self.signals.get_latest(&change.pair, change.timeframe).await {
            Ok(Some(signal)) => signal,
            Ok(None) => {
                tracing::warn!(pair = %change.pair, ?change.timeframe, "signal.changed published with no persisted signal");
                return;
            }
            Err(err) => {
                tracing::warn!(%err, pair = %change.pair, "failed to load signal for delivery");
                return;
            }
        };

        let subscribers = match self.subscriptions.list_subscribers(&signal.pair, signal.timeframe).await {
            Ok(subs) => subs,
            Err(err) => {
                tracing::warn!(%err, pair = %signal.pair, "failed to load subscribers");
                return;
            }
        };

        let level = eligibility::signal_notification_level(signal.confidence);

        for subscription in subscribers {
            let this_signal = signal.clone();
            self.deliver_to(subscription, this_signal, level).await;
        }
    }

    async fn deliver_to(&self, subscription: Subscription, signal: Signal, level: NotificationLevel) {
        let policy = match self.policies.get(subscription.user_id).await {
            Ok(Some(policy)) => policy,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(%err, user_id = %subscription.user_id, "failed to load user policy");
                return;
            }
        };

        if !eligibility::policy_allows(&policy, &signal.pair, signal.timeframe, signal.confidence) {
            return;
        }
        if eligibility::ml_only_blocks(&policy, &signal.model_version) {
            return;
        }

        let now = Utc::now();
        if eligibility::mute_window_blocks(&policy, now) {
            return;
        }

        let dedup_window = chrono::Duration::from_std(self.config.dedup_window).unwrap_or_else(|_| chrono::Duration::minutes(30));
        match self
            .notifications
            .last_sent_for_pair(subscription.user_id, &signal.pair, signal.timeframe)
            .await
        {
            Ok(Some((last_direction, last_sent))) => {
                let elapsed = now - last_sent;
                if elapsed < chrono::Duration::minutes(policy.cooldown_minutes) {
                    return;
                }
                if last_direction == signal.direction && elapsed < dedup_window {
                    return;
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%err, user_id = %subscription.user_id, "failed to read notification history");
                return;
            }
        }

        match self.notifications.count_since(subscription.user_id, now - chrono::Duration::hours(24)).await {
            Ok(count) if count >= policy.daily_quota => return,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(%err, user_id = %subscription.user_id, "failed to read daily quota count");
                return;
            }
        }

        let payload = DeliveryPayload {
            subject: ReceiptSubject::Signal(signal.id),
            pair: signal.pair.clone(),
            timeframe: signal.timeframe,
            direction: signal.direction,
            confidence: signal.confidence,
            entry: signal.entry,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            factors: signal.factors.clone(),
            model_version: signal.model_version.clone(),
            level,
            generated_at: now,
        };

        let recipient = subscription
            .discord_id
            .clone()
            .or_else(|| subscription.channel_id.clone())
            .unwrap_or_else(|| subscription.user_id.to_string());

        self.dispatch(subscription.user_id, &recipient, &payload).await;
    }

    /// Hands `payload` to every configured transport independently, each
    /// with its own retry loop; records one receipt per transport that
    /// accepted it. A transport that exhausts its retries is logged and
    /// skipped — it never blocks the remaining transports or recipients.
    async fn dispatch(&self, user_id: Uuid, recipient: &str, payload: &DeliveryPayload) {
        for channel in &self.channels {
            if self.send_with_retry(channel.as_ref(), recipient, payload).await {
                let receipt = NotificationReceipt {
                    id: Uuid::new_v4(),
                    subject: payload.subject,
                    user_id,
                    channel: channel.name().to_string(),
                    sent_at: payload.generated_at,
                    level: payload.level,
                };
                if let Err(err) = self.notifications.record_receipt(receipt).await {
                    tracing::warn!(%err, channel = channel.name(), "failed to persist notification receipt");
                }
            }
        }
    }

    async fn send_with_retry(&self, channel: &dyn NotificationChannel, recipient: &str, payload: &DeliveryPayload) -> bool {
        let mut delay = Duration::from_millis(self.config.retry_base_delay_ms);
        for attempt in 1..=self.config.retry_max_attempts {
            match channel.send(recipient, payload).await {
                Ok(_) => return true,
                Err(err) => {
                    tracing::warn!(%err, channel = channel.name(), attempt, "delivery attempt failed");
                    if attempt < self.config.retry_max_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        false
    }
}
