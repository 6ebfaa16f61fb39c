use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::requests::Requester;
use teloxide::types::{ChatId, ParseMode, Recipient};
use teloxide::Bot;
use tracing::debug;

use super::{Channel, Delivery};
use crate::alert::{Alert, ChatTarget};
use crate::config::TelegramConfig;

pub struct TelegramChannel {
    bot: Bot,
    default_chat: ChatTarget,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let api_url = reqwest::Url::parse(&config.api_url)
            .with_context(|| format!("Invalid telegram.api_url: {}", config.api_url))?;
        Ok(Self {
            bot: Bot::new(&config.token).set_api_url(api_url),
            default_chat: config.channel.clone(),
        })
    }
}

/// Map a destination onto the Bot API's recipient forms.
///
/// Numeric strings are chat ids (channel ids arrive as `"-100..."`),
/// anything else is treated as a public `@username`.
fn recipient(target: &ChatTarget) -> Recipient {
    match target {
        ChatTarget::Id(id) => Recipient::Id(ChatId(*id)),
        ChatTarget::Name(name) => match name.trim().parse::<i64>() {
            Ok(id) => Recipient::Id(ChatId(id)),
            Err(_) if name.starts_with('@') => Recipient::ChannelUsername(name.clone()),
            Err(_) => Recipient::ChannelUsername(format!("@{}", name)),
        },
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, alert: &Alert) -> Result<Delivery> {
        let target = alert
            .payload
            .telegram
            .get("telegram")?
            .unwrap_or(&self.default_chat);
        debug!("Sending Telegram alert to {}", target);

        // Alert templates are written for the legacy Markdown dialect.
        #[allow(deprecated)]
        let parse_mode = ParseMode::Markdown;

        self.bot
            .send_message(recipient(target), alert.message.clone())
            .parse_mode(parse_mode)
            .await
            .with_context(|| format!("Telegram sendMessage to {} failed", target))?;

        Ok(Delivery::Sent)
    }
}
