use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::alert::ChatTarget;

/// Host prefix every Graph API endpoint must start with.
pub const TRUSTED_GRAPH_PREFIX: &str = "https://graph.microsoft.com/";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub teams: TeamsConfig,
    #[serde(default)]
    pub teams_api: TeamsApiConfig,
    #[serde(default)]
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Must match the `key` field of every inbound alert.
    pub secret_key: String,
    #[serde(default = "default_allowed_ips")]
    pub allowed_ips: Vec<IpAddr>,
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
}

impl ServerConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    /// Default chat id or `@channel` when the alert names none.
    #[serde(default = "default_telegram_channel")]
    pub channel: ChatTarget,
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Webhook path segment (`<id>/<token>`).
    #[serde(default)]
    pub webhook: String,
    #[serde(default = "default_discord_base_url")]
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Webhook path segment (`T.../B.../...`).
    #[serde(default)]
    pub webhook: String,
    #[serde(default = "default_slack_base_url")]
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TeamsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Full incoming webhook URL.
    #[serde(default)]
    pub webhook: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TeamsApiConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Graph endpoint template containing `{chat-id}` or `{user-id}`.
    #[serde(default = "default_teams_api_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub access_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TwitterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub consumer_key: String,
    #[serde(default)]
    pub consumer_secret: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub access_secret: String,
    #[serde(default = "default_twitter_base_url")]
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub receivers: Vec<String>,
    #[serde(default = "default_email_subject")]
    pub subject: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_email_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Published egress addresses of the alerting provider.
fn default_allowed_ips() -> Vec<IpAddr> {
    [
        Ipv4Addr::new(52, 89, 214, 238),
        Ipv4Addr::new(34, 212, 75, 30),
        Ipv4Addr::new(54, 218, 53, 128),
        Ipv4Addr::new(52, 32, 178, 7),
    ]
    .into_iter()
    .map(IpAddr::V4)
    .collect()
}

fn default_delivery_timeout_secs() -> u64 {
    10
}

fn default_telegram_channel() -> ChatTarget {
    ChatTarget::Id(0)
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_discord_base_url() -> String {
    "https://discord.com".to_string()
}

fn default_slack_base_url() -> String {
    "https://hooks.slack.com".to_string()
}

fn default_teams_api_endpoint() -> String {
    "https://graph.microsoft.com/v1.0/chats/{chat-id}/messages".to_string()
}

fn default_twitter_base_url() -> String {
    "https://api.twitter.com".to_string()
}

fn default_email_subject() -> String {
    "Trade Alert!".to_string()
}

fn default_email_port() -> u16 {
    465
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            channel: default_telegram_channel(),
            api_url: default_telegram_api_url(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook: String::new(),
            base_url: default_discord_base_url(),
        }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook: String::new(),
            base_url: default_slack_base_url(),
        }
    }
}

impl Default for TeamsApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_teams_api_endpoint(),
            access_token: String::new(),
        }
    }
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            consumer_key: String::new(),
            consumer_secret: String::new(),
            access_token: String::new(),
            access_secret: String::new(),
            base_url: default_twitter_base_url(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sender: String::new(),
            receivers: Vec::new(),
            subject: default_email_subject(),
            host: String::new(),
            port: default_email_port(),
            user: String::new(),
            password: String::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        if config.server.secret_key.is_empty() {
            anyhow::bail!("server.secret_key must not be empty");
        }
        if config.server.delivery_timeout_secs == 0 {
            anyhow::bail!("server.delivery_timeout_secs must be greater than zero");
        }

        Ok(config)
    }

    /// Names of the channels switched on, in dispatch order.
    pub fn enabled_channels(&self) -> Vec<&'static str> {
        [
            ("telegram", self.telegram.enabled),
            ("discord", self.discord.enabled),
            ("slack", self.slack.enabled),
            ("teams", self.teams.enabled),
            ("teams_api", self.teams_api.enabled),
            ("twitter", self.twitter.enabled),
            ("email", self.email.enabled),
        ]
        .into_iter()
        .filter_map(|(name, enabled)| enabled.then_some(name))
        .collect()
    }
}
