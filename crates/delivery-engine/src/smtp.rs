use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::channel::{DeliverAck, NotificationChannel};
use crate::config::{DeliveryConfig, SmtpTls};
use crate::error::DeliveryError;
use crate::payload::DeliveryPayload;

pub struct SmtpChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpChannel {
    pub fn new(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| DeliveryError::Config("SMTP_HOST not set".into()))?;
        let from_addr = config
            .smtp_from
            .as_deref()
            .ok_or_else(|| DeliveryError::Config("SMTP_FROM_ADDRESS not set".into()))?;

        let from: Mailbox = from_addr
            .parse()
            .map_err(|e| DeliveryError::Config(format!("invalid from address: {e}")))?;

        let mut builder = match config.smtp_tls {
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
            SmtpTls::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)),
        }
        .map_err(|e| DeliveryError::Smtp(format!("transport error: {e}")))?;

        builder = builder.port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl NotificationChannel for SmtpChannel {
    async fn send(&self, recipient: &str, payload: &DeliveryPayload) -> Result<DeliverAck, DeliveryError> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| DeliveryError::Config(format!("invalid recipient address: {e}")))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(payload.title())
            .header(ContentType::TEXT_HTML)
            .body(payload.html())
            .map_err(|e| DeliveryError::Smtp(format!("failed to build email: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| DeliveryError::Smtp(format!("failed to send email: {e}")))?;

        Ok(DeliverAck {
            accepted: true,
            message_ref: None,
        })
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
