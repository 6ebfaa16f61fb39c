use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A Telegram destination: numeric chat id or `@channel` username.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ChatTarget {
    Id(i64),
    Name(String),
}

impl std::fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatTarget::Id(id) => write!(f, "{}", id),
            ChatTarget::Name(name) => write!(f, "{}", name),
        }
    }
}

/// An optional payload field. A value of the wrong type is kept so that
/// only the channel reading it fails.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Missing,
    Present(T),
    Mistyped(Value),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Missing
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(Field::Missing);
        }
        Ok(match T::deserialize(&value) {
            Ok(parsed) => Field::Present(parsed),
            Err(_) => Field::Mistyped(value),
        })
    }
}

impl<T> Field<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Field::Missing)
    }

    pub fn get(&self, name: &str) -> Result<Option<&T>> {
        match self {
            Field::Missing => Ok(None),
            Field::Present(value) => Ok(Some(value)),
            Field::Mistyped(raw) => {
                anyhow::bail!("alert field `{}` has the wrong type: {}", name, raw)
            }
        }
    }
}

impl Field<String> {
    pub fn get_str(&self, name: &str) -> Result<Option<&str>> {
        Ok(self.get(name)?.map(String::as_str))
    }
}

/// JSON body posted by the alerting provider.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertPayload {
    pub key: String,
    pub msg: String,
    #[serde(default)]
    pub telegram: Field<ChatTarget>,
    #[serde(default)]
    pub discord: Field<String>,
    #[serde(default)]
    pub slack: Field<String>,
    #[serde(default)]
    pub teams: Field<String>,
    #[serde(default)]
    pub teams_to: Field<String>,
    #[serde(default)]
    pub correlation_id: Option<Value>,
}

impl AlertPayload {
    /// Destination overrides carried by the payload, for logging.
    pub fn override_fields(&self) -> Vec<&'static str> {
        [
            ("telegram", !self.telegram.is_missing()),
            ("discord", !self.discord.is_missing()),
            ("slack", !self.slack.is_missing()),
            ("teams", !self.teams.is_missing()),
        ]
        .into_iter()
        .filter_map(|(name, present)| present.then_some(name))
        .collect()
    }
}

/// A payload whose message has been unescaped once for all channels.
#[derive(Debug, Clone)]
pub struct Alert {
    pub payload: AlertPayload,
    pub message: String,
}

impl Alert {
    pub fn from_payload(payload: AlertPayload) -> Result<Self> {
        let message = unescape(&payload.msg).context("Invalid escape sequence in msg")?;
        Ok(Self { payload, message })
    }

    /// Correlation id supplied by the caller, if any and non-empty.
    /// Non-string values are used in their JSON form.
    pub fn correlation_id(&self) -> Option<String> {
        let id = match self.payload.correlation_id.as_ref()? {
            Value::Null => return None,
            Value::String(id) => id.clone(),
            other => other.to_string(),
        };
        (!id.is_empty()).then_some(id)
    }
}

/// Pick the payload value when present, else the configured default.
pub fn resolve<'a>(from_payload: Option<&'a str>, configured: &'a str) -> &'a str {
    from_payload.unwrap_or(configured)
}

/// Decode backslash escapes (`\n`, `\t`, `\xHH`, `\uHHHH`, `\UHHHHHHHH`,
/// octal, quotes) the way alert templates write them.
///
/// Unknown escapes are kept verbatim. Truncated hex escapes and escapes
/// naming invalid code points are errors.
pub fn unescape(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        let Some(esc) = chars.next() else {
            anyhow::bail!("trailing backslash");
        };

        match esc {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{0B}'),
            '0'..='7' => {
                let mut value = esc.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(code_point(value)?);
            }
            'x' => {
                let value = take_hex(&mut chars, 2, 'x')?;
                out.push(code_point(value)?);
            }
            'u' => {
                let value = take_hex(&mut chars, 4, 'u')?;
                if (0xD800..0xDC00).contains(&value) {
                    out.push(combine_surrogates(value, &mut chars)?);
                } else {
                    out.push(code_point(value)?);
                }
            }
            'U' => {
                let value = take_hex(&mut chars, 8, 'U')?;
                out.push(code_point(value)?);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    Ok(out)
}

fn take_hex(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    digits: usize,
    kind: char,
) -> Result<u32> {
    let mut value = 0u32;
    for _ in 0..digits {
        let digit = chars
            .next()
            .and_then(|d| d.to_digit(16))
            .with_context(|| format!("truncated \\{} escape", kind))?;
        value = value * 16 + digit;
    }
    Ok(value)
}

fn code_point(value: u32) -> Result<char> {
    char::from_u32(value).with_context(|| format!("invalid code point U+{:04X}", value))
}

/// A `\uD8xx` high surrogate must be followed by a `\uDCxx` low surrogate.
fn combine_surrogates(
    high: u32,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<char> {
    let mut lookahead = chars.clone();
    if lookahead.next() == Some('\\') && lookahead.next() == Some('u') {
        let low = take_hex(&mut lookahead, 4, 'u')?;
        if (0xDC00..0xE000).contains(&low) {
            *chars = lookahead;
            return code_point(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00));
        }
    }
    anyhow::bail!("unpaired surrogate U+{:04X}", high)
}

/// Teams cards render `**bold**` but not `*bold*`, and show backticks raw.
pub fn teams_markdown(text: &str) -> String {
    text.replace('*', "**").replace('`', "")
}

/// Plain-text sinks get the message without emphasis or code markers.
pub fn strip_markdown(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '`'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> AlertPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_unescape_common_sequences() {
        assert_eq!(unescape(r"line1\nline2\ttab").unwrap(), "line1\nline2\ttab");
        assert_eq!(unescape(r#"say \"hi\" \\ done"#).unwrap(), "say \"hi\" \\ done");
        assert_eq!(unescape(r"\x41\101\u00e9").unwrap(), "AAé");
        assert_eq!(unescape(r"\U0001F680 moon").unwrap(), "🚀 moon");
    }

    #[test]
    fn test_unescape_passes_plain_text_through() {
        let msg = "Long #BTCUSD at `50000` → 🚀 café";
        assert_eq!(unescape(msg).unwrap(), msg);
    }

    #[test]
    fn test_unescape_keeps_unknown_escapes() {
        assert_eq!(unescape(r"C:\path\q").unwrap(), r"C:\path\q");
    }

    #[test]
    fn test_unescape_line_continuation() {
        assert_eq!(unescape("a\\\nb").unwrap(), "ab");
    }

    #[test]
    fn test_unescape_surrogate_pair() {
        assert_eq!(unescape(r"\ud83d\ude80").unwrap(), "🚀");
        assert!(unescape(r"\ud83d alone").is_err());
        assert!(unescape(r"\udc00").is_err());
    }

    #[test]
    fn test_unescape_rejects_truncated_escapes() {
        assert!(unescape(r"\x4").is_err());
        assert!(unescape(r"\u12").is_err());
        assert!(unescape(r"\xZZ").is_err());
        assert!(unescape("ends with \\").is_err());
    }

    #[test]
    fn test_teams_markdown() {
        assert_eq!(
            teams_markdown("*Long* #BTCUSD at `50000`"),
            "**Long** #BTCUSD at 50000"
        );
    }

    #[test]
    fn test_strip_markdown() {
        assert_eq!(
            strip_markdown("*Long* _now_ at `50000`"),
            "Long now at 50000"
        );
    }

    #[test]
    fn test_payload_optional_fields() {
        let p = payload(r#"{"key":"k","msg":"m"}"#);
        assert!(p.telegram.is_missing());
        assert!(p.override_fields().is_empty());

        let p = payload(
            r#"{"key":"k","msg":"m","telegram":"-1001298977502","discord":"1/x","extra":42}"#,
        );
        assert_eq!(
            p.telegram,
            Field::Present(ChatTarget::Name("-1001298977502".into()))
        );
        assert_eq!(p.override_fields(), vec!["telegram", "discord"]);

        let p = payload(r#"{"key":"k","msg":"m","telegram":-100}"#);
        assert_eq!(p.telegram, Field::Present(ChatTarget::Id(-100)));
    }

    #[test]
    fn test_mistyped_destination_fails_only_its_reader() {
        let p = payload(
            r#"{"key":"k","msg":"m","discord":123,"telegram":true,"slack":null,"teams":"https://t"}"#,
        );
        let err = p.discord.get_str("discord").unwrap_err();
        assert!(err.to_string().contains("`discord` has the wrong type: 123"));
        assert!(p.telegram.get("telegram").is_err());
        assert_eq!(p.slack.get_str("slack").unwrap(), None);
        assert_eq!(p.teams.get_str("teams").unwrap(), Some("https://t"));
        assert_eq!(p.override_fields(), vec!["telegram", "discord", "teams"]);
    }

    #[test]
    fn test_correlation_id_accepts_scalars() {
        let alert = Alert::from_payload(payload(
            r#"{"key":"k","msg":"m","correlation_id":42}"#,
        ))
        .unwrap();
        assert_eq!(alert.correlation_id().as_deref(), Some("42"));

        let alert = Alert::from_payload(payload(
            r#"{"key":"k","msg":"m","correlation_id":null}"#,
        ))
        .unwrap();
        assert_eq!(alert.correlation_id(), None);
    }

    #[test]
    fn test_payload_requires_msg() {
        assert!(serde_json::from_str::<AlertPayload>(r#"{"key":"k"}"#).is_err());
        assert!(serde_json::from_str::<AlertPayload>(r#"{"key":"k","msg":7}"#).is_err());
    }

    #[test]
    fn test_alert_correlation_id_ignores_empty() {
        let alert = Alert::from_payload(payload(
            r#"{"key":"k","msg":"m","correlation_id":""}"#,
        ))
        .unwrap();
        assert_eq!(alert.correlation_id(), None);

        let alert = Alert::from_payload(payload(
            r#"{"key":"k","msg":"a\\nb","correlation_id":"trade-123"}"#,
        ))
        .unwrap();
        assert_eq!(alert.correlation_id().as_deref(), Some("trade-123"));
        assert_eq!(alert.message, "a\nb");
    }

    #[test]
    fn test_resolve_prefers_payload() {
        assert_eq!(resolve(Some("from-alert"), "configured"), "from-alert");
        assert_eq!(resolve(None, "configured"), "configured");
    }
}
