use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::render::PanelEmbed;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("sink error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Text,
    Voice,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: u64,
    pub kind: ChannelKind,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub channel_id: u64,
    pub author_id: u64,
    pub embeds: Vec<PanelEmbed>,
}

impl ChatMessage {
    pub fn panel(&self) -> Option<&PanelEmbed> {
        self.embeds.first()
    }
}

/// Chat platform operations the synchronizer writes through.
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Identity the sink posts as; used to recognise its own panels in channel history.
    async fn current_user_id(&self) -> Result<u64, SinkError>;
    async fn fetch_channel(&self, channel_id: u64) -> Result<ChannelInfo, SinkError>;
    async fn fetch_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<ChatMessage, SinkError>;
    /// Most recent messages first.
    async fn fetch_recent_messages(
        &self,
        channel_id: u64,
        limit: u8,
    ) -> Result<Vec<ChatMessage>, SinkError>;
    async fn send_message(
        &self,
        channel_id: u64,
        panel: &PanelEmbed,
    ) -> Result<ChatMessage, SinkError>;
    async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        panel: &PanelEmbed,
    ) -> Result<ChatMessage, SinkError>;
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), SinkError>;
    async fn rename_channel(&self, channel_id: u64, name: &str) -> Result<(), SinkError>;
}
