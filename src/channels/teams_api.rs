//! Direct Teams chat messages through the Microsoft Graph API.
//!
//! The endpoint comes from configuration and the recipient from the alert,
//! so both are checked before any request leaves the process: the endpoint
//! must sit under the Graph host, and the recipient may only contain
//! characters that cannot alter the URL it is substituted into.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::{send_checked, Channel, Delivery};
use crate::alert::Alert;
use crate::config::{TeamsApiConfig, TRUSTED_GRAPH_PREFIX};

const ENDPOINT_PLACEHOLDERS: [&str; 2] = ["{chat-id}", "{user-id}"];

pub struct TeamsApiChannel {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
    trusted_prefix: &'static str,
}

impl TeamsApiChannel {
    pub fn new(config: &TeamsApiConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            access_token: config.access_token.clone(),
            trusted_prefix: TRUSTED_GRAPH_PREFIX,
        }
    }

    #[cfg(test)]
    fn with_trusted_prefix(mut self, prefix: &'static str) -> Self {
        self.trusted_prefix = prefix;
        self
    }
}

/// Letters, digits and `@ . - _`, with at most one `@`.
pub fn is_valid_recipient(recipient: &str) -> bool {
    !recipient.is_empty()
        && recipient
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '-' | '_'))
        && recipient.matches('@').count() <= 1
}

fn endpoint_for(template: &str, recipient: &str) -> String {
    ENDPOINT_PLACEHOLDERS
        .iter()
        .fold(template.to_string(), |url, placeholder| {
            url.replace(placeholder, recipient)
        })
}

fn adaptive_card(message: &str, correlation_id: Option<&str>) -> Value {
    let mut body = vec![
        json!({
            "type": "TextBlock",
            "size": "Medium",
            "weight": "Bolder",
            "text": "TradingView Alert"
        }),
        json!({
            "type": "TextBlock",
            "text": message,
            "wrap": true
        }),
    ];

    if let Some(id) = correlation_id {
        body.push(json!({
            "type": "TextBlock",
            "text": format!("Correlation ID: {}", id),
            "size": "Small",
            "isSubtle": true,
            "wrap": true
        }));
    }

    json!({
        "type": "AdaptiveCard",
        "body": body,
        "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
        "version": "1.4"
    })
}

/// Graph chatMessage wrapping the card as its single attachment.
fn chat_message(message: &str, correlation_id: Option<&str>) -> Value {
    let attachment_id = correlation_id
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    json!({
        "body": {
            "contentType": "html",
            "content": format!("<attachment id=\"{}\"></attachment>", attachment_id)
        },
        "attachments": [{
            "id": attachment_id,
            "contentType": "application/vnd.microsoft.card.adaptive",
            "content": adaptive_card(message, correlation_id)
        }]
    })
}

#[async_trait]
impl Channel for TeamsApiChannel {
    fn name(&self) -> &'static str {
        "teams_api"
    }

    async fn send(&self, alert: &Alert) -> Result<Delivery> {
        let recipient = match alert.payload.teams_to.get_str("teams_to")? {
            Some(to) if !to.is_empty() => to,
            _ => return Ok(Delivery::Skipped("alert has no teams_to recipient".into())),
        };
        if self.access_token.is_empty() {
            return Ok(Delivery::Skipped("no Graph access token configured".into()));
        }

        if !self.endpoint.starts_with(self.trusted_prefix) {
            anyhow::bail!(
                "Invalid endpoint: must be a Microsoft Graph API URL under {}",
                self.trusted_prefix
            );
        }
        if !is_valid_recipient(recipient) {
            anyhow::bail!("Invalid teams_to format: {}", recipient);
        }

        let correlation_id = alert.correlation_id();
        let request = self
            .client
            .post(endpoint_for(&self.endpoint, recipient))
            .bearer_auth(&self.access_token)
            .json(&chat_message(&alert.message, correlation_id.as_deref()));
        send_checked(request, "Teams Graph API").await?;

        match correlation_id.as_deref() {
            Some(id) => info!("Teams API message sent. Correlation ID: {}", id),
            None => info!("Teams API message sent."),
        }

        Ok(Delivery::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertPayload;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alert(json: &str) -> Alert {
        let payload: AlertPayload = serde_json::from_str(json).unwrap();
        Alert::from_payload(payload).unwrap()
    }

    fn config(endpoint: &str, token: &str) -> TeamsApiConfig {
        TeamsApiConfig {
            enabled: true,
            endpoint: endpoint.into(),
            access_token: token.into(),
        }
    }

    #[test]
    fn test_recipient_validation() {
        assert!(is_valid_recipient("user@example.com"));
        assert!(is_valid_recipient("19-abc_def.thread"));
        assert!(!is_valid_recipient("user@@bad"));
        assert!(!is_valid_recipient("a@b@c"));
        assert!(!is_valid_recipient("../../users"));
        assert!(!is_valid_recipient("x?redirect=evil"));
        assert!(!is_valid_recipient("user name"));
        assert!(!is_valid_recipient(""));
    }

    #[test]
    fn test_endpoint_placeholders_replaced() {
        assert_eq!(
            endpoint_for(
                "https://graph.microsoft.com/v1.0/chats/{chat-id}/messages",
                "abc"
            ),
            "https://graph.microsoft.com/v1.0/chats/abc/messages"
        );
        assert_eq!(
            endpoint_for(
                "https://graph.microsoft.com/v1.0/users/{user-id}/chats",
                "u@x.com"
            ),
            "https://graph.microsoft.com/v1.0/users/u@x.com/chats"
        );
    }

    #[test]
    fn test_chat_message_uses_correlation_id() {
        let msg = chat_message("hello", Some("trade-123"));
        assert_eq!(
            msg["body"]["content"],
            "<attachment id=\"trade-123\"></attachment>"
        );
        assert_eq!(msg["attachments"][0]["id"], "trade-123");
        let card = &msg["attachments"][0]["content"];
        assert_eq!(card["version"], "1.4");
        assert_eq!(card["body"].as_array().unwrap().len(), 3);
        assert_eq!(card["body"][1]["text"], "hello");
        assert_eq!(card["body"][2]["text"], "Correlation ID: trade-123");
    }

    #[test]
    fn test_chat_message_generates_attachment_id() {
        let msg = chat_message("hello", None);
        let id = msg["attachments"][0]["id"].as_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(
            msg["body"]["content"],
            format!("<attachment id=\"{}\"></attachment>", id)
        );
        assert_eq!(
            msg["attachments"][0]["content"]["body"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_untrusted_endpoint_rejected_without_request() {
        let server = MockServer::start().await;
        let channel = TeamsApiChannel::new(
            &config(&format!("{}/v1.0/chats/{{chat-id}}/messages", server.uri()), "token"),
            reqwest::Client::new(),
        );

        let err = channel
            .send(&alert(r#"{"key":"k","msg":"hi","teams_to":"user@example.com"}"#))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid endpoint"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_recipient_rejected_without_request() {
        let server = MockServer::start().await;
        let channel = TeamsApiChannel::new(
            &config(&format!("{}/v1.0/chats/{{chat-id}}/messages", server.uri()), "token"),
            reqwest::Client::new(),
        )
        .with_trusted_prefix("http://");

        let err = channel
            .send(&alert(r#"{"key":"k","msg":"hi","teams_to":"user@@bad"}"#))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid teams_to"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skipped_without_recipient_or_token() {
        let channel = TeamsApiChannel::new(
            &config("https://graph.microsoft.com/v1.0/chats/{chat-id}/messages", "token"),
            reqwest::Client::new(),
        );
        let outcome = channel
            .send(&alert(r#"{"key":"k","msg":"hi"}"#))
            .await
            .unwrap();
        assert!(matches!(outcome, Delivery::Skipped(_)));

        let channel = TeamsApiChannel::new(
            &config("https://graph.microsoft.com/v1.0/chats/{chat-id}/messages", ""),
            reqwest::Client::new(),
        );
        let outcome = channel
            .send(&alert(r#"{"key":"k","msg":"hi","teams_to":"user@example.com"}"#))
            .await
            .unwrap();
        assert!(matches!(outcome, Delivery::Skipped(_)));
    }

    #[tokio::test]
    async fn test_posts_card_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.0/chats/19-chat.v2/messages"))
            .and(header("authorization", "Bearer graph-token"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let channel = TeamsApiChannel::new(
            &config(
                &format!("{}/v1.0/chats/{{chat-id}}/messages", server.uri()),
                "graph-token",
            ),
            reqwest::Client::new(),
        )
        .with_trusted_prefix("http://");

        let outcome = channel
            .send(&alert(
                r#"{"key":"k","msg":"Long BTC","teams_to":"19-chat.v2","correlation_id":"trade-9"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(outcome, Delivery::Sent);

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        assert_eq!(body["attachments"][0]["id"], "trade-9");
        assert_eq!(
            body["attachments"][0]["content"]["body"][1]["text"],
            "Long BTC"
        );
    }
}
