use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use super::{Channel, Delivery};
use crate::alert::{strip_markdown, Alert};
use crate::config::EmailConfig;

/// Sends the alert as a plain-text email over SMTPS.
pub struct EmailChannel {
    config: EmailConfig,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

fn build_message(config: &EmailConfig, text: &str) -> Result<Message> {
    if config.receivers.is_empty() {
        anyhow::bail!("No email receivers configured");
    }

    let from: Mailbox = config
        .sender
        .parse()
        .with_context(|| format!("Invalid sender address: {}", config.sender))?;

    let mut builder = Message::builder()
        .from(from)
        .subject(config.subject.as_str())
        .header(ContentType::TEXT_PLAIN);
    for receiver in &config.receivers {
        let to: Mailbox = receiver
            .parse()
            .with_context(|| format!("Invalid receiver address: {}", receiver))?;
        builder = builder.to(to);
    }

    builder
        .body(strip_markdown(text))
        .context("Failed to build email message")
}

#[async_trait]
impl Channel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, alert: &Alert) -> Result<Delivery> {
        let email = build_message(&self.config, &alert.message)?;

        let creds = Credentials::new(self.config.user.clone(), self.config.password.clone());

        // Implicit TLS; without the pool feature the session is closed after this send.
        let mailer: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
                .with_context(|| format!("Failed to create SMTP transport for {}", self.config.host))?
                .port(self.config.port)
                .credentials(creds)
                .build();

        debug!(
            "Sending email alert via {}:{} to {} receiver(s)",
            self.config.host,
            self.config.port,
            self.config.receivers.len()
        );

        mailer
            .send(email)
            .await
            .context("Failed to send email via SMTP")?;

        Ok(Delivery::Sent)
    }
}
