//! Discord REST (v10) implementation of [`ChatSink`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::render::{EmbedField, PanelEmbed};
use crate::sink::{ChannelInfo, ChannelKind, ChatMessage, ChatSink, SinkError};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

pub struct DiscordSink {
    http: Client,
    api_base: String,
    token: String,
    me: OnceCell<u64>,
}

impl DiscordSink {
    pub fn new(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self, SinkError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("DiscordBot (panelsync, {})", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SinkError::Other(format!("http client: {e}")))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            me: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn execute(&self, req: RequestBuilder) -> Result<Response, SinkError> {
        let response = req
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|e| SinkError::Other(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        let err = classify(status, &headers, &body);
        debug!(status = status.as_u16(), error = %err, "discord request failed");
        Err(err)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, SinkError> {
        self.execute(req)
            .await?
            .json::<T>()
            .await
            .map_err(|e| SinkError::Other(format!("unexpected response: {e}")))
    }
}

#[async_trait]
impl ChatSink for DiscordSink {
    async fn current_user_id(&self) -> Result<u64, SinkError> {
        let id = self
            .me
            .get_or_try_init(|| async {
                let user: WireUser = self.fetch_json(self.http.get(self.url("/users/@me"))).await?;
                parse_snowflake(&user.id)
            })
            .await?;
        Ok(*id)
    }

    async fn fetch_channel(&self, channel_id: u64) -> Result<ChannelInfo, SinkError> {
        let channel: WireChannel = self
            .fetch_json(self.http.get(self.url(&format!("/channels/{channel_id}"))))
            .await?;
        channel.into_info()
    }

    async fn fetch_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<ChatMessage, SinkError> {
        let url = self.url(&format!("/channels/{channel_id}/messages/{message_id}"));
        let message: WireMessage = self.fetch_json(self.http.get(url)).await?;
        message.into_message()
    }

    async fn fetch_recent_messages(
        &self,
        channel_id: u64,
        limit: u8,
    ) -> Result<Vec<ChatMessage>, SinkError> {
        let url = self.url(&format!("/channels/{channel_id}/messages"));
        let req = self.http.get(url).query(&[("limit", limit.clamp(1, 100))]);
        let messages: Vec<WireMessage> = self.fetch_json(req).await?;
        messages.into_iter().map(WireMessage::into_message).collect()
    }

    async fn send_message(
        &self,
        channel_id: u64,
        panel: &PanelEmbed,
    ) -> Result<ChatMessage, SinkError> {
        let url = self.url(&format!("/channels/{channel_id}/messages"));
        let req = self.http.post(url).json(&message_body(panel));
        let message: WireMessage = self.fetch_json(req).await?;
        message.into_message()
    }

    async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        panel: &PanelEmbed,
    ) -> Result<ChatMessage, SinkError> {
        let url = self.url(&format!("/channels/{channel_id}/messages/{message_id}"));
        let req = self.http.patch(url).json(&message_body(panel));
        let message: WireMessage = self.fetch_json(req).await?;
        message.into_message()
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), SinkError> {
        let url = self.url(&format!("/channels/{channel_id}/messages/{message_id}"));
        self.execute(self.http.delete(url)).await?;
        Ok(())
    }

    async fn rename_channel(&self, channel_id: u64, name: &str) -> Result<(), SinkError> {
        let url = self.url(&format!("/channels/{channel_id}"));
        self.execute(self.http.patch(url).json(&json!({ "name": name })))
            .await?;
        Ok(())
    }
}

fn classify(status: StatusCode, headers: &HeaderMap, body: &str) -> SinkError {
    match status {
        StatusCode::NOT_FOUND => SinkError::NotFound,
        StatusCode::FORBIDDEN => SinkError::Forbidden,
        StatusCode::TOO_MANY_REQUESTS => {
            let header = headers.get(RETRY_AFTER).and_then(|v| v.to_str().ok());
            SinkError::RateLimited {
                retry_after: retry_after(body, header),
            }
        }
        other => SinkError::Other(format!("http {}: {}", other.as_u16(), truncate(body, 200))),
    }
}

/// Discord reports the wait in fractional seconds in the body; the header is the fallback.
fn retry_after(body: &str, header: Option<&str>) -> Duration {
    #[derive(Deserialize)]
    struct RateLimitBody {
        retry_after: f64,
    }

    let from_body = serde_json::from_str::<RateLimitBody>(body)
        .ok()
        .map(|b| b.retry_after);
    let from_header = header.and_then(|h| h.trim().parse::<f64>().ok());

    match from_body.or(from_header) {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Duration::from_secs_f64(secs),
        Some(secs) => {
            warn!(retry_after = secs, "ignoring invalid retry_after");
            DEFAULT_RETRY_AFTER
        }
        None => DEFAULT_RETRY_AFTER,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn parse_snowflake(raw: &str) -> Result<u64, SinkError> {
    raw.parse()
        .map_err(|_| SinkError::Other(format!("invalid snowflake {raw:?}")))
}

fn channel_kind(kind: u8) -> ChannelKind {
    match kind {
        0 | 5 => ChannelKind::Text,
        2 | 13 => ChannelKind::Voice,
        _ => ChannelKind::Other,
    }
}

fn message_body(panel: &PanelEmbed) -> serde_json::Value {
    let mut embed = WireEmbed::from(panel);
    embed.timestamp = Some(Utc::now().to_rfc3339());
    json!({ "embeds": [embed] })
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireChannel {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
}

impl WireChannel {
    fn into_info(self) -> Result<ChannelInfo, SinkError> {
        Ok(ChannelInfo {
            id: parse_snowflake(&self.id)?,
            kind: channel_kind(self.kind),
            name: self.name.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    channel_id: String,
    author: WireUser,
    #[serde(default)]
    embeds: Vec<WireEmbed>,
}

impl WireMessage {
    fn into_message(self) -> Result<ChatMessage, SinkError> {
        Ok(ChatMessage {
            id: parse_snowflake(&self.id)?,
            channel_id: parse_snowflake(&self.channel_id)?,
            author_id: parse_snowflake(&self.author.id)?,
            embeds: self.embeds.into_iter().map(PanelEmbed::from).collect(),
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireEmbed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<WireField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thumbnail: Option<WireMedia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<WireMedia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    footer: Option<WireFooter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireField {
    name: String,
    value: String,
    #[serde(default)]
    inline: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMedia {
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFooter {
    text: String,
}

impl From<&PanelEmbed> for WireEmbed {
    fn from(panel: &PanelEmbed) -> Self {
        Self {
            title: Some(panel.title.clone()),
            description: panel.description.clone(),
            color: Some(panel.color),
            fields: panel
                .fields
                .iter()
                .map(|f| WireField {
                    name: f.name.clone(),
                    value: f.value.clone(),
                    inline: f.inline,
                })
                .collect(),
            thumbnail: panel.thumbnail_url.clone().map(|url| WireMedia { url }),
            image: panel.image_url.clone().map(|url| WireMedia { url }),
            footer: panel.footer.clone().map(|text| WireFooter { text }),
            timestamp: None,
        }
    }
}

impl From<WireEmbed> for PanelEmbed {
    fn from(embed: WireEmbed) -> Self {
        Self {
            title: embed.title.unwrap_or_default(),
            description: embed.description,
            color: embed.color.unwrap_or(0),
            fields: embed
                .fields
                .into_iter()
                .map(|f| EmbedField {
                    name: f.name,
                    value: f.value,
                    inline: f.inline,
                })
                .collect(),
            thumbnail_url: embed.thumbnail.map(|m| m.url),
            image_url: embed.image.map(|m| m.url),
            footer: embed.footer.map(|f| f.text),
        }
    }
}
