pub mod discord;
pub mod email;
pub mod slack;
pub mod teams;
pub mod teams_api;
pub mod telegram;
pub mod twitter;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::alert::Alert;
use crate::config::Config;

/// What a channel did with an alert when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Enabled, but nothing to deliver to (e.g. no destination resolved).
    Skipped(String),
}

/// One outbound notification sink.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Attempt delivery exactly once. No retries.
    async fn send(&self, alert: &Alert) -> Result<Delivery>;
}

/// Build one sender per enabled channel, in dispatch order.
pub fn from_config(config: &Config, client: &reqwest::Client) -> Result<Vec<Arc<dyn Channel>>> {
    let mut channels: Vec<Arc<dyn Channel>> = Vec::new();

    if config.telegram.enabled {
        channels.push(Arc::new(telegram::TelegramChannel::new(&config.telegram)?));
    }
    if config.discord.enabled {
        channels.push(Arc::new(discord::DiscordChannel::new(
            &config.discord,
            client.clone(),
        )));
    }
    if config.slack.enabled {
        channels.push(Arc::new(slack::SlackChannel::new(
            &config.slack,
            client.clone(),
        )));
    }
    if config.teams.enabled {
        channels.push(Arc::new(teams::TeamsChannel::new(
            &config.teams,
            client.clone(),
        )));
    }
    if config.teams_api.enabled {
        channels.push(Arc::new(teams_api::TeamsApiChannel::new(
            &config.teams_api,
            client.clone(),
        )));
    }
    if config.twitter.enabled {
        channels.push(Arc::new(twitter::TwitterChannel::new(
            &config.twitter,
            client.clone(),
        )));
    }
    if config.email.enabled {
        channels.push(Arc::new(email::EmailChannel::new(&config.email)));
    }

    Ok(channels)
}

/// Send a prepared request and fail on any non-2xx status.
pub(crate) async fn send_checked(
    request: reqwest::RequestBuilder,
    sink: &str,
) -> Result<reqwest::Response> {
    let response = request
        .send()
        .await
        .with_context(|| format!("Failed to send request to {}", sink))?;

    let status = response.status();
    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        anyhow::bail!("{} error ({}): {}", sink, status, error_body);
    }

    Ok(response)
}

/// Join a base URL and a path segment with exactly one slash between them.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
