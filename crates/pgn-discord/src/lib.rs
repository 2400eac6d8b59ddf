//! Discord adapter (REST API over reqwest).
//!
//! This crate implements the `pgn-core` MessagingPort against the Discord
//! HTTP API, registers the slash-command table and serves the signed
//! interactions endpoint that answers those commands.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

pub mod commands;
pub mod interactions;

use pgn_core::{
    config::DiscordConfig,
    domain::{ChannelId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, SummaryContent},
    },
    Result,
};

const API_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_FIELDS: usize = 25;
const MAX_FIELD_NAME_LEN: usize = 256;
const MAX_FIELD_VALUE_LEN: usize = 1024;
const MAX_TITLE_LEN: usize = 256;
const MAX_LIST_LIMIT: u8 = 100;
/// Longer rate-limit waits are left to the next cycle.
pub const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);

/// Discord JSON error code for "Unknown Message".
pub const UNKNOWN_MESSAGE_CODE: u64 = 10008;

#[derive(Clone)]
pub struct DiscordMessenger {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
}

/// Error body returned by the Discord API.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
    /// Seconds, present on 429 responses.
    #[serde(default)]
    pub retry_after: Option<f64>,
}

#[derive(Debug)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub body: ApiErrorBody,
}

impl ApiFailure {
    pub fn from_response(status: StatusCode, text: &str) -> Self {
        let body = serde_json::from_str::<ApiErrorBody>(text).unwrap_or_else(|_| ApiErrorBody {
            message: Some(text.trim().to_string()).filter(|s| !s.is_empty()),
            ..ApiErrorBody::default()
        });
        Self { status, body }
    }

    /// The target message id is invalid or was deleted.
    pub fn is_unknown_message(&self) -> bool {
        self.body.code == Some(UNKNOWN_MESSAGE_CODE)
            || self
                .body
                .message
                .as_deref()
                .is_some_and(|m| m.contains("Unknown Message"))
    }

    fn retry_after(&self) -> Option<Duration> {
        let secs = self.body.retry_after?;
        if secs.is_finite() && secs >= 0.0 {
            Some(Duration::from_secs_f64(secs))
        } else {
            None
        }
    }

    /// Map into the core error; only a failed call on a known target can be "not found".
    pub fn into_error(self, target: Option<&MessageRef>) -> Error {
        match target {
            Some(msg) if self.is_unknown_message() => Error::message_not_found(msg),
            _ => Error::External(format!(
                "discord error {}: {} (code {})",
                self.status.as_u16(),
                self.body.message.as_deref().unwrap_or("no message"),
                self.body
                    .code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string()),
            )),
        }
    }
}

impl DiscordMessenger {
    pub fn new(cfg: &DiscordConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .user_agent("DiscordBot (pgn, 0.1)")
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
        })
    }

    /// Verify the token by fetching the bot's own user.
    pub async fn current_user(&self) -> Result<CurrentUser> {
        self.call_json(Method::GET, "/users/@me", None, None).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        target: Option<&MessageRef>,
    ) -> Result<reqwest::Response> {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            let mut req = self
                .http
                .request(method.clone(), self.url(path))
                .header(AUTHORIZATION, format!("Bot {}", self.token));
            if let Some(b) = body {
                req = req.json(b);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| Error::External(format!("discord request failed: {e}")))?;
            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }

            let text = resp.text().await.unwrap_or_default();
            let failure = ApiFailure::from_response(status, &text);
            if status == StatusCode::TOO_MANY_REQUESTS && attempts < MAX_RETRIES {
                match failure.retry_after() {
                    Some(wait) if wait <= MAX_RETRY_WAIT => {
                        attempts += 1;
                        debug!(path, ?wait, "rate limited, retrying");
                        sleep(wait).await;
                        continue;
                    }
                    Some(wait) => warn!(path, ?wait, "rate limited for too long, not retrying"),
                    None => {}
                }
            }
            return Err(failure.into_error(target));
        }
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        target: Option<&MessageRef>,
    ) -> Result<T> {
        let resp = self.execute(method, path, body, target).await?;
        resp.json::<T>()
            .await
            .map_err(|e| Error::External(format!("invalid discord response: {e}")))
    }

    pub(crate) async fn put_json(&self, path: &str, body: &Value) -> Result<Value> {
        self.call_json(Method::PUT, path, Some(body), None).await
    }
}

/// Embed body for a summary, clipped to Discord's limits.
pub fn embed_payload(summary: &SummaryContent) -> Value {
    let fields: Vec<Value> = summary
        .fields
        .iter()
        .take(MAX_FIELDS)
        .map(|f| {
            json!({
                "name": non_blank(clip(&f.name, MAX_FIELD_NAME_LEN)),
                "value": non_blank(clip(&f.value, MAX_FIELD_VALUE_LEN)),
                "inline": f.inline,
            })
        })
        .collect();

    json!({
        "embeds": [{
            "title": clip(&summary.title, MAX_TITLE_LEN),
            "fields": fields,
            "timestamp": summary.timestamp.to_rfc3339(),
        }]
    })
}

pub(crate) fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

// Discord rejects empty field names/values.
fn non_blank(s: String) -> String {
    if s.trim().is_empty() {
        "\u{200b}".to_string()
    } else {
        s
    }
}

#[async_trait]
impl MessagingPort for DiscordMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_fields: MAX_FIELDS,
            max_field_value_len: MAX_FIELD_VALUE_LEN,
            max_list_limit: MAX_LIST_LIMIT,
        }
    }

    async fn send_summary(
        &self,
        channel_id: &ChannelId,
        summary: &SummaryContent,
    ) -> Result<MessageRef> {
        let path = format!("/channels/{channel_id}/messages");
        let msg: MessageResponse = self
            .call_json(Method::POST, &path, Some(&embed_payload(summary)), None)
            .await?;
        Ok(MessageRef::new(channel_id.clone(), MessageId(msg.id)))
    }

    async fn edit_summary(&self, msg: &MessageRef, summary: &SummaryContent) -> Result<MessageRef> {
        let path = format!("/channels/{}/messages/{}", msg.channel_id, msg.message_id);
        let edited: MessageResponse = self
            .call_json(Method::PATCH, &path, Some(&embed_payload(summary)), Some(msg))
            .await?;
        Ok(MessageRef::new(msg.channel_id.clone(), MessageId(edited.id)))
    }

    async fn list_recent(&self, channel_id: &ChannelId, limit: u8) -> Result<Vec<MessageRef>> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        let path = format!("/channels/{channel_id}/messages?limit={limit}");
        let msgs: Vec<MessageResponse> = self.call_json(Method::GET, &path, None, None).await?;
        Ok(msgs
            .into_iter()
            .map(|m| MessageRef::new(channel_id.clone(), MessageId(m.id)))
            .collect())
    }

    async fn delete_message(&self, msg: &MessageRef) -> Result<()> {
        let path = format!("/channels/{}/messages/{}", msg.channel_id, msg.message_id);
        self.execute(Method::DELETE, &path, None, Some(msg)).await?;
        Ok(())
    }
}
