use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha1::Sha1;
use uuid::Uuid;

use super::{join_url, send_checked, Channel, Delivery};
use crate::alert::{strip_markdown, Alert};
use crate::config::TwitterConfig;

type HmacSha1 = Hmac<Sha1>;

/// Application and user tokens for OAuth 1.0a user-context requests.
#[derive(Debug, Clone)]
struct OAuthCredentials {
    consumer_key: String,
    consumer_secret: String,
    access_token: String,
    access_secret: String,
}

/// Posts the alert as a plain-text tweet.
pub struct TwitterChannel {
    client: reqwest::Client,
    base_url: String,
    credentials: OAuthCredentials,
}

impl TwitterChannel {
    pub fn new(config: &TwitterConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            credentials: OAuthCredentials {
                consumer_key: config.consumer_key.clone(),
                consumer_secret: config.consumer_secret.clone(),
                access_token: config.access_token.clone(),
                access_secret: config.access_secret.clone(),
            },
        }
    }
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// HMAC-SHA1 signature over the normalized request (RFC 5849 §3.4).
fn signature(
    method: &str,
    url: &str,
    params: &[(&str, &str)],
    consumer_secret: &str,
    token_secret: &str,
) -> Result<String> {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (encode(k), encode(v)))
        .collect();
    pairs.sort();

    let param_string = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let base = format!(
        "{}&{}&{}",
        method.to_uppercase(),
        encode(url),
        encode(&param_string)
    );
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));

    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid OAuth signing key: {}", e))?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// `Authorization: OAuth ...` value for a JSON-bodied request.
///
/// JSON bodies are not part of the signature base string, so only the
/// protocol parameters are signed.
fn authorization_header(
    method: &str,
    url: &str,
    credentials: &OAuthCredentials,
    nonce: &str,
    timestamp: i64,
) -> Result<String> {
    let timestamp = timestamp.to_string();
    let mut params = vec![
        ("oauth_consumer_key", credentials.consumer_key.as_str()),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp.as_str()),
        ("oauth_token", credentials.access_token.as_str()),
        ("oauth_version", "1.0"),
    ];

    let signature = signature(
        method,
        url,
        &params,
        &credentials.consumer_secret,
        &credentials.access_secret,
    )?;
    params.push(("oauth_signature", signature.as_str()));
    params.sort();

    let fields = params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("OAuth {}", fields))
}

#[async_trait]
impl Channel for TwitterChannel {
    fn name(&self) -> &'static str {
        "twitter"
    }

    async fn send(&self, alert: &Alert) -> Result<Delivery> {
        let url = join_url(&self.base_url, "2/tweets");
        let nonce = Uuid::new_v4().simple().to_string();
        let auth = authorization_header(
            "POST",
            &url,
            &self.credentials,
            &nonce,
            chrono::Utc::now().timestamp(),
        )?;

        let request = self
            .client
            .post(&url)
            .header("Authorization", auth)
            .json(&json!({ "text": strip_markdown(&alert.message) }));
        send_checked(request, "Twitter").await?;

        Ok(Delivery::Sent)
    }
}
