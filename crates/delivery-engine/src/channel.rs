use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::payload::DeliveryPayload;

#[derive(Debug, Clone)]
pub struct DeliverAck {
    pub accepted: bool,
    pub message_ref: Option<String>,
}

/// A transport the delivery engine can hand a formatted payload to. Must be
/// idempotent on the payload's implicit message id (subject + level +
/// recipient) so a retried send never double-delivers in a way the
/// transport itself can detect.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, recipient: &str, payload: &DeliveryPayload) -> Result<DeliverAck, DeliveryError>;
    fn name(&self) -> &'static str;
}

pub struct DiscordWebhookChannel {
    pub webhook_url: String,
    pub client: reqwest::Client,
}

#[async_trait]
impl NotificationChannel for DiscordWebhookChannel {
    async fn send(&self, _recipient: &str, payload: &DeliveryPayload) -> Result<DeliverAck, DeliveryError> {
        let color = match payload.direction {
            fx_core::Direction::Long => 0x22c55e,
            fx_core::Direction::Short => 0xef4444,
            fx_core::Direction::Hold => 0x64748b,
        };
        let body = serde_json::json!({
            "embeds": [{
                "title": payload.title(),
                "description": payload.plain_text(),
                "color": color,
                "timestamp": payload.generated_at.to_rfc3339(),
            }]
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Discord(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DeliveryError::Discord(format!(
                "webhook returned status {}",
                response.status()
            )));
        }

        Ok(DeliverAck {
            accepted: true,
            message_ref: None,
        })
    }

    fn name(&self) -> &'static str {
        "discord-webhook"
    }
}
