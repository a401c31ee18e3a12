//! On-demand operations behind the command surface. Each call reports success or failure
//! explicitly, unlike the background cycle which only logs.

use thiserror::Error;
use tracing::{info, warn};

use crate::a2s::ServerQuery;
use crate::record::{parse_hex_color, Layout, ServerRecord};
use crate::render::{render_panel, PanelEmbed};
use crate::sink::{ChannelKind, ChatSink, SinkError};
use crate::status::ServerStatus;
use crate::store::StoreError;
use crate::synchronizer::{Synchronizer, TargetOutcome};
use crate::throttle::with_rate_limit_retry;
use crate::writer::{self, PanelOutcome, WriteError};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("target {host}:{port} is unreachable: {reason}")]
    Unreachable { host: String, port: u16, reason: String },
    #[error("invalid color {0:?}, expected six hex digits such as FF0000")]
    InvalidColor(String),
    #[error("invalid url {0:?}, expected http:// or https://")]
    InvalidUrl(String),
    #[error("channel {channel_id} is not a {expected:?} channel")]
    WrongChannelKind { channel_id: u64, expected: ChannelKind },
    #[error("target #{id} has no {kind:?} channel configured")]
    ChannelNotConfigured { id: u64, kind: ChannelKind },
}

/// Optional appearance changes; `None` leaves a setting untouched.
#[derive(Debug, Clone, Default)]
pub struct Customization {
    pub title: Option<String>,
    pub color: Option<String>,
    pub show_progress: Option<bool>,
    pub show_map: Option<bool>,
    pub show_address: Option<bool>,
    pub display_port: Option<u16>,
    pub thumbnail_url: Option<String>,
    pub footer_text: Option<String>,
    pub update_name: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImageChange {
    #[default]
    Keep,
    Set(String),
    Reset,
}

/// What a configuration command changed and whether the panel could be refreshed afterwards.
#[derive(Debug)]
pub struct ConfigChange {
    pub changes: Vec<String>,
    pub panel: Option<Result<PanelOutcome, WriteError>>,
}

fn check_url(url: &str) -> Result<(), CommandError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(CommandError::InvalidUrl(url.to_string()))
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

impl<Q: ServerQuery, S: ChatSink> Synchronizer<Q, S> {
    async fn status_of(&mut self, id: u64) -> Result<ServerStatus, CommandError> {
        let (host, port) = {
            let record = self.store.get(id)?;
            (record.ip.clone(), record.port)
        };
        self.querier
            .query(&host, port)
            .await
            .map_err(|err| CommandError::Unreachable {
                host,
                port,
                reason: err.to_string(),
            })
    }

    pub async fn add_target(
        &mut self,
        host: &str,
        port: u16,
        name: &str,
        display_port: Option<u16>,
    ) -> Result<(u64, Option<ServerStatus>), CommandError> {
        let id = self.store.add(host, port, name, display_port)?;
        let first_status = self.status_of(id).await.ok();
        if let Some(status) = &first_status {
            self.store.update(id, |r| r.last_online = status.occupancy())?;
        }
        Ok((id, first_status))
    }

    pub async fn remove_target(&mut self, id: u64) -> Result<ServerRecord, CommandError> {
        let record = self.store.get(id)?;
        writer::delete_panel(&self.sink, record).await;
        Ok(self.store.remove(id)?)
    }

    pub async fn test_target(&mut self, id: u64) -> Result<ServerStatus, CommandError> {
        self.status_of(id).await
    }

    pub async fn refresh_target(&mut self, id: u64) -> Result<TargetOutcome, CommandError> {
        match self.sync_target(id).await? {
            TargetOutcome::Unreachable(reason) => {
                let record = self.store.get(id)?;
                Err(CommandError::Unreachable {
                    host: record.ip.clone(),
                    port: record.port,
                    reason,
                })
            }
            synced => Ok(synced),
        }
    }

    /// Points the panel (text) or voice-name projection at a channel after checking its kind.
    pub async fn set_channel(
        &mut self,
        id: u64,
        kind: ChannelKind,
        channel_id: u64,
    ) -> Result<(), CommandError> {
        self.store.get(id)?;
        let channel = self.sink.fetch_channel(channel_id).await?;
        if channel.kind != kind || kind == ChannelKind::Other {
            return Err(CommandError::WrongChannelKind {
                channel_id,
                expected: kind,
            });
        }

        self.store.update(id, |r| match kind {
            ChannelKind::Text => {
                if r.text_channel_id != Some(channel_id) {
                    r.message_id = None;
                }
                r.text_channel_id = Some(channel_id);
            }
            _ => r.voice_channel_id = Some(channel_id),
        })?;
        info!(target_id = id, channel_id, kind = ?kind, "channel configured");
        Ok(())
    }

    pub async fn customize(
        &mut self,
        id: u64,
        custom: Customization,
    ) -> Result<ConfigChange, CommandError> {
        self.store.get(id)?;
        let color = match custom.color.as_deref() {
            Some(raw) => Some(
                parse_hex_color(raw)
                    .map(|c| format!("{c:06X}"))
                    .ok_or_else(|| CommandError::InvalidColor(raw.to_string()))?,
            ),
            None => None,
        };
        if let Some(url) = custom.thumbnail_url.as_deref() {
            check_url(url)?;
        }

        let changes = self.store.update(id, |r| {
            let mut changes = Vec::new();
            if let Some(title) = custom.title {
                changes.push(format!("title: {title}"));
                r.embed_title = title;
            }
            if let Some(color) = color {
                changes.push(format!("color: #{color}"));
                r.embed_color = color;
            }
            if let Some(flag) = custom.show_progress {
                r.show_progress = flag;
                changes.push(format!("progress bar: {}", on_off(flag)));
            }
            if let Some(flag) = custom.show_map {
                r.show_map = flag;
                changes.push(format!("map: {}", on_off(flag)));
            }
            if let Some(flag) = custom.show_address {
                r.show_address = flag;
                changes.push(format!("address: {}", on_off(flag)));
            }
            if let Some(port) = custom.display_port {
                r.display_port = Some(port);
                changes.push(format!("display port: {port}"));
            }
            if let Some(url) = custom.thumbnail_url {
                changes.push(format!("thumbnail: {url}"));
                r.thumbnail_url = Some(url);
            }
            if let Some(footer) = custom.footer_text {
                changes.push(format!("footer: {footer}"));
                r.footer_text = footer;
            }
            if let Some(flag) = custom.update_name {
                r.update_name = flag;
                changes.push(format!("voice rename: {}", on_off(flag)));
            }
            changes
        })?;

        let panel = self.refresh_panel(id).await;
        Ok(ConfigChange { changes, panel })
    }

    pub async fn set_design(
        &mut self,
        id: u64,
        layout: Layout,
        image: ImageChange,
    ) -> Result<ConfigChange, CommandError> {
        self.store.get(id)?;
        if let ImageChange::Set(url) = &image {
            check_url(url)?;
        }

        let changes = self.store.update(id, |r| {
            let mut changes = vec![format!("design: {}", layout.label())];
            r.design = layout;
            match image {
                ImageChange::Keep => {}
                ImageChange::Set(url) => {
                    changes.push(format!("image: {url}"));
                    r.image_url = Some(url);
                }
                ImageChange::Reset => {
                    changes.push("image: reset".to_string());
                    r.image_url = None;
                }
            }
            changes
        })?;

        let panel = self.refresh_panel(id).await;
        Ok(ConfigChange { changes, panel })
    }

    /// Re-renders the panel after a configuration change; `None` when the target did not answer.
    async fn refresh_panel(&mut self, id: u64) -> Option<Result<PanelOutcome, WriteError>> {
        let status = match self.status_of(id).await {
            Ok(status) => status,
            Err(err) => {
                warn!(target_id = id, error = %err, "panel not refreshed");
                return None;
            }
        };
        let limit = self.config.history_scan_limit;
        Some(writer::sync_panel(&self.sink, &mut self.store, id, &status, limit).await)
    }

    pub async fn preview(
        &mut self,
        id: u64,
        layout: Option<Layout>,
    ) -> Result<PanelEmbed, CommandError> {
        let status = self.status_of(id).await?;
        let mut record = self.store.get(id)?.clone();
        if let Some(layout) = layout {
            record.design = layout;
        }
        Ok(render_panel(&record, &status))
    }

    /// Deletes the tracked panel message (a missing one is fine) and posts a fresh panel.
    pub async fn recreate_panel(&mut self, id: u64) -> Result<u64, CommandError> {
        let channel_id = self
            .store
            .get(id)?
            .text_channel_id
            .ok_or(CommandError::ChannelNotConfigured {
                id,
                kind: ChannelKind::Text,
            })?;
        let status = self.status_of(id).await?;

        let channel = self.sink.fetch_channel(channel_id).await?;
        if channel.kind != ChannelKind::Text {
            return Err(CommandError::WrongChannelKind {
                channel_id,
                expected: ChannelKind::Text,
            });
        }

        let record = self.store.get(id)?;
        writer::delete_panel(&self.sink, record).await;
        let panel = render_panel(record, &status);

        let sink = &self.sink;
        let body = &panel;
        let sent =
            with_rate_limit_retry("send panel", move || sink.send_message(channel_id, body)).await?;
        self.store.update(id, |r| {
            r.message_id = Some(sent.id);
            r.last_online = status.occupancy();
        })?;
        info!(target_id = id, message_id = sent.id, "panel recreated");
        Ok(sent.id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::SyncConfig;
    use crate::store::RecordStore;
    use crate::testing::{FakeQuery, FakeSink, Op};

    const TEXT: u64 = 10;
    const VOICE: u64 = 20;

    fn synchronizer() -> Synchronizer<FakeQuery, FakeSink> {
        let query = FakeQuery::default();
        query.set("10.0.0.1", 27015, Ok((10, 32)));
        let sink = FakeSink::default()
            .with_channel(TEXT, ChannelKind::Text, "status")
            .with_channel(VOICE, ChannelKind::Voice, "General");
        Synchronizer::new(RecordStore::in_memory(), query, sink, SyncConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn add_queries_once_and_records_occupancy() {
        let mut sync = synchronizer();

        let (id, status) = sync.add_target("10.0.0.1", 27015, "Alpha", None).await.expect("add");

        assert_eq!(status.map(|s| s.occupancy()), Some((10, 32)));
        assert_eq!(sync.store().get(id).expect("record").last_online, (10, 32));
    }

    #[tokio::test(start_paused = true)]
    async fn add_keeps_unreachable_targets() {
        let mut sync = synchronizer();

        let (id, status) = sync.add_target("10.9.9.9", 27015, "Ghost", None).await.expect("add");

        assert!(status.is_none());
        assert!(sync.store().get(id).is_ok());
        assert!(matches!(
            sync.add_target("10.9.9.9", 27015, "Ghost", None).await,
            Err(CommandError::Store(StoreError::DuplicateTarget { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn set_channel_validates_kind() {
        let mut sync = synchronizer();
        let (id, _) = sync.add_target("10.0.0.1", 27015, "Alpha", None).await.expect("add");

        assert!(matches!(
            sync.set_channel(id, ChannelKind::Voice, TEXT).await,
            Err(CommandError::WrongChannelKind { .. })
        ));
        assert!(matches!(
            sync.set_channel(id, ChannelKind::Text, 999).await,
            Err(CommandError::Sink(SinkError::NotFound))
        ));

        sync.set_channel(id, ChannelKind::Text, TEXT).await.expect("text");
        sync.set_channel(id, ChannelKind::Voice, VOICE).await.expect("voice");
        let record = sync.store().get(id).expect("record");
        assert_eq!((record.text_channel_id, record.voice_channel_id), (Some(TEXT), Some(VOICE)));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_deletes_panel_then_record() {
        let mut sync = synchronizer();
        let (id, _) = sync.add_target("10.0.0.1", 27015, "Alpha", None).await.expect("add");
        sync.set_channel(id, ChannelKind::Text, TEXT).await.expect("text");
        sync.refresh_target(id).await.expect("refresh");
        assert_eq!(sync.sink().messages(TEXT).len(), 1);

        let removed = sync.remove_target(id).await.expect("remove");

        assert_eq!(removed.name, "Alpha");
        assert!(sync.sink().messages(TEXT).is_empty());
        assert!(matches!(sync.store().get(id), Err(StoreError::TargetNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_survives_failed_panel_delete() {
        let mut sync = synchronizer();
        let (id, _) = sync.add_target("10.0.0.1", 27015, "Alpha", None).await.expect("add");
        sync.set_channel(id, ChannelKind::Text, TEXT).await.expect("text");
        sync.refresh_target(id).await.expect("refresh");
        sync.sink().fail_next(Op::Delete, [SinkError::Forbidden]);

        sync.remove_target(id).await.expect("remove");

        assert!(sync.store().is_empty());
        assert_eq!(sync.sink().messages(TEXT).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn customize_rejects_bad_input_without_changes() {
        let mut sync = synchronizer();
        let (id, _) = sync.add_target("10.0.0.1", 27015, "Alpha", None).await.expect("add");

        let bad_color = Customization {
            title: Some("New".into()),
            color: Some("red".into()),
            ..Customization::default()
        };
        assert!(matches!(sync.customize(id, bad_color).await, Err(CommandError::InvalidColor(_))));

        let bad_url = Customization {
            thumbnail_url: Some("ftp://x".into()),
            ..Customization::default()
        };
        assert!(matches!(sync.customize(id, bad_url).await, Err(CommandError::InvalidUrl(_))));

        assert_eq!(sync.store().get(id).expect("record").embed_title, crate::record::DEFAULT_TITLE);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_renames_the_voice_channel_on_demand() {
        let mut sync = synchronizer();
        let (id, _) = sync.add_target("10.0.0.1", 27015, "Alpha", None).await.expect("add");
        sync.set_channel(id, ChannelKind::Voice, VOICE).await.expect("voice");

        sync.refresh_target(id).await.expect("refresh");

        assert_eq!(sync.sink().write_count(Op::Rename), 1);
        let name = sync.sink().channel_name(VOICE).expect("voice channel");
        assert!(name.contains("10/32"), "{name}");

        // Occupancy moves and the cache expires: the next refresh follows it.
        sync.querier().client().set("10.0.0.1", 27015, Ok((11, 32)));
        tokio::time::advance(Duration::from_secs(31)).await;
        sync.refresh_target(id).await.expect("refresh");

        assert_eq!(sync.sink().write_count(Op::Rename), 2);
        let name = sync.sink().channel_name(VOICE).expect("voice channel");
        assert!(name.contains("11/32"), "{name}");
    }

    #[tokio::test(start_paused = true)]
    async fn color_change_rewrites_only_the_panel() {
        let mut sync = synchronizer();
        let (id, _) = sync.add_target("10.0.0.1", 27015, "Alpha", None).await.expect("add");
        sync.set_channel(id, ChannelKind::Text, TEXT).await.expect("text");
        sync.set_channel(id, ChannelKind::Voice, VOICE).await.expect("voice");
        sync.refresh_target(id).await.expect("refresh");
        let before = sync.sink().writes().len();

        let change = sync
            .customize(
                id,
                Customization {
                    color: Some("ff0000".into()),
                    ..Customization::default()
                },
            )
            .await
            .expect("customize");
        sync.refresh_target(id).await.expect("refresh");

        assert_eq!(change.changes, ["color: #FF0000"]);
        assert!(matches!(change.panel, Some(Ok(PanelOutcome::Edited))));
        let writes = sync.sink().writes();
        assert_eq!(writes.len(), before + 1);
        assert_eq!(writes.last().map(|w| w.0), Some(Op::Edit));
        assert_eq!(sync.sink().messages(TEXT)[0].embeds[0].color, 0xFF0000);
    }

    #[tokio::test(start_paused = true)]
    async fn design_switch_with_image() {
        let mut sync = synchronizer();
        let (id, _) = sync.add_target("10.0.0.1", 27015, "Alpha", None).await.expect("add");
        sync.set_channel(id, ChannelKind::Text, TEXT).await.expect("text");

        let change = sync
            .set_design(id, Layout::Vertical, ImageChange::Set("https://img/banner.png".into()))
            .await
            .expect("design");

        assert!(matches!(change.panel, Some(Ok(PanelOutcome::Created))));
        let panel = &sync.sink().messages(TEXT)[0].embeds[0];
        assert_eq!(panel.title, "🎮 Alpha");
        assert_eq!(panel.image_url.as_deref(), Some("https://img/banner.png"));

        sync.set_design(id, Layout::Vertical, ImageChange::Reset).await.expect("reset");
        assert_eq!(sync.store().get(id).expect("record").image_url, None);
    }

    #[tokio::test(start_paused = true)]
    async fn preview_does_not_write() {
        let mut sync = synchronizer();
        let (id, _) = sync.add_target("10.0.0.1", 27015, "Alpha", None).await.expect("add");
        sync.set_channel(id, ChannelKind::Text, TEXT).await.expect("text");

        let panel = sync.preview(id, Some(Layout::Vertical)).await.expect("preview");

        assert_eq!(panel.title, "🎮 Alpha");
        assert!(sync.sink().writes().is_empty());
        assert_eq!(sync.store().get(id).expect("record").design, Layout::Compact);
    }

    #[tokio::test(start_paused = true)]
    async fn recreate_replaces_the_panel_message() {
        let mut sync = synchronizer();
        let (id, _) = sync.add_target("10.0.0.1", 27015, "Alpha", None).await.expect("add");
        assert!(matches!(
            sync.recreate_panel(id).await,
            Err(CommandError::ChannelNotConfigured { .. })
        ));
        sync.set_channel(id, ChannelKind::Text, TEXT).await.expect("text");
        sync.refresh_target(id).await.expect("refresh");
        let old = sync.store().get(id).expect("record").message_id.expect("panel id");

        let new = sync.recreate_panel(id).await.expect("recreate");

        assert_ne!(old, new);
        let messages = sync.sink().messages(TEXT);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, new);
        assert_eq!(sync.store().get(id).expect("record").message_id, Some(new));
    }

    #[tokio::test(start_paused = true)]
    async fn on_demand_reports_unreachable() {
        let mut sync = synchronizer();
        let (id, _) = sync.add_target("10.9.9.9", 27015, "Ghost", None).await.expect("add");

        assert!(matches!(sync.test_target(id).await, Err(CommandError::Unreachable { .. })));
        assert!(matches!(sync.refresh_target(id).await, Err(CommandError::Unreachable { .. })));
        assert!(matches!(
            sync.test_target(77).await,
            Err(CommandError::Store(StoreError::TargetNotFound(77)))
        ));
    }
}
