use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{join_url, send_checked, Channel, Delivery};
use crate::alert::{resolve, Alert};
use crate::config::DiscordConfig;

/// Posts the alert as a title-only embed to a Discord webhook.
pub struct DiscordChannel {
    client: reqwest::Client,
    base_url: String,
    default_webhook: String,
}

impl DiscordChannel {
    pub fn new(config: &DiscordConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            default_webhook: config.webhook.clone(),
        }
    }

    fn webhook_url(&self, path: &str) -> String {
        join_url(&self.base_url, &format!("api/webhooks/{}", path))
    }
}

fn embed_body(message: &str) -> Value {
    json!({ "embeds": [{ "title": message }] })
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, alert: &Alert) -> Result<Delivery> {
        let path = resolve(alert.payload.discord.get_str("discord")?, &self.default_webhook);
        if path.is_empty() {
            return Ok(Delivery::Skipped("no Discord webhook configured".into()));
        }

        let request = self
            .client
            .post(self.webhook_url(path))
            .json(&embed_body(&alert.message));
        send_checked(request, "Discord").await?;

        Ok(Delivery::Sent)
    }
}
