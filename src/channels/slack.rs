use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use super::{join_url, send_checked, Channel, Delivery};
use crate::alert::{resolve, Alert};
use crate::config::SlackConfig;

pub struct SlackChannel {
    client: reqwest::Client,
    base_url: String,
    default_webhook: String,
}

impl SlackChannel {
    pub fn new(config: &SlackConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            default_webhook: config.webhook.clone(),
        }
    }
}

#[async_trait]
impl Channel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, alert: &Alert) -> Result<Delivery> {
        let path = resolve(alert.payload.slack.get_str("slack")?, &self.default_webhook);
        if path.is_empty() {
            return Ok(Delivery::Skipped("no Slack webhook configured".into()));
        }

        let url = join_url(&self.base_url, &format!("services/{}", path));
        let request = self
            .client
            .post(url)
            .json(&json!({ "text": alert.message }));
        send_checked(request, "Slack").await?;

        Ok(Delivery::Sent)
    }
}
