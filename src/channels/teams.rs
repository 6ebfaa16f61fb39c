use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{send_checked, Channel, Delivery};
use crate::alert::{resolve, teams_markdown, Alert};
use crate::config::TeamsConfig;

/// Teams incoming webhook using the legacy MessageCard format.
pub struct TeamsChannel {
    client: reqwest::Client,
    default_webhook: String,
}

impl TeamsChannel {
    pub fn new(config: &TeamsConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            default_webhook: config.webhook.clone(),
        }
    }
}

fn message_card(message: &str) -> Value {
    json!({
        "@type": "MessageCard",
        "@context": "https://schema.org/extensions",
        "summary": "Trading Alert",
        "themeColor": "0078D7",
        "title": "TradingView Alert",
        "text": teams_markdown(message),
    })
}

#[async_trait]
impl Channel for TeamsChannel {
    fn name(&self) -> &'static str {
        "teams"
    }

    async fn send(&self, alert: &Alert) -> Result<Delivery> {
        let url = resolve(alert.payload.teams.get_str("teams")?, &self.default_webhook);
        if url.is_empty() {
            return Ok(Delivery::Skipped("no Teams webhook URL".into()));
        }

        let request = self.client.post(url).json(&message_card(&alert.message));
        send_checked(request, "Teams webhook").await?;

        Ok(Delivery::Sent)
    }
}
