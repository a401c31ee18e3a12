use thiserror::Error;
use tracing::{debug, info, warn};

use crate::record::ServerRecord;
use crate::render::{render_panel, voice_channel_name, PanelEmbed};
use crate::sink::{ChannelKind, ChatMessage, ChatSink, SinkError};
use crate::status::ServerStatus;
use crate::store::{RecordStore, StoreError};
use crate::throttle::with_rate_limit_retry;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("channel {channel_id} is not a {expected:?} channel")]
    WrongChannelKind { channel_id: u64, expected: ChannelKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelOutcome {
    NotConfigured,
    Unchanged,
    Edited,
    Created,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceOutcome {
    NotConfigured,
    Disabled,
    Unchanged,
    Renamed,
}

impl PanelOutcome {
    pub fn wrote(self) -> bool {
        matches!(self, PanelOutcome::Edited | PanelOutcome::Created)
    }
}

impl VoiceOutcome {
    pub fn wrote(self) -> bool {
        self == VoiceOutcome::Renamed
    }
}

/// Brings the target's panel message in line with `status`, writing only when the live
/// message differs from the freshly rendered projection.
pub async fn sync_panel<S: ChatSink>(
    sink: &S,
    store: &mut RecordStore,
    id: u64,
    status: &ServerStatus,
    scan_limit: u8,
) -> Result<PanelOutcome, WriteError> {
    let record = store.get(id)?;
    let Some(channel_id) = record.text_channel_id else {
        return Ok(PanelOutcome::NotConfigured);
    };
    let rendered = render_panel(record, status);
    let tracked = record.message_id;
    let mut target = None;

    if let Some(message_id) = tracked {
        match sink.fetch_message(channel_id, message_id).await {
            Ok(live) if live.panel() == Some(&rendered) => {
                debug!(target_id = id, message_id, "panel unchanged, skipping write");
                return Ok(PanelOutcome::Unchanged);
            }
            Ok(_) => target = Some(message_id),
            Err(SinkError::NotFound) => {
                info!(target_id = id, message_id, "tracked panel message is gone");
                store.update(id, |r| r.message_id = None)?;
            }
            Err(err) => {
                warn!(
                    target_id = id,
                    message_id,
                    error = %err,
                    "could not read tracked panel, editing it anyway"
                );
                target = Some(message_id);
            }
        }
    }

    if target.is_none() {
        if let Some(adopted) = find_recent_panel(sink, channel_id, scan_limit).await? {
            info!(
                target_id = id,
                message_id = adopted.id,
                "adopted existing panel from channel history"
            );
            store.update(id, |r| r.message_id = Some(adopted.id))?;
            if adopted.panel() == Some(&rendered) {
                return Ok(PanelOutcome::Unchanged);
            }
            target = Some(adopted.id);
        }
    }

    write_panel(sink, store, id, channel_id, target, &rendered).await
}

/// Best-effort recovery of a lost panel reference: the newest message in the channel that this
/// sink authored and that carries an embed. In a busy channel this can pick the wrong message.
async fn find_recent_panel<S: ChatSink>(
    sink: &S,
    channel_id: u64,
    scan_limit: u8,
) -> Result<Option<ChatMessage>, WriteError> {
    let me = sink.current_user_id().await?;
    match sink.fetch_recent_messages(channel_id, scan_limit).await {
        Ok(recent) => Ok(recent
            .into_iter()
            .find(|m| m.author_id == me && !m.embeds.is_empty())),
        Err(SinkError::Forbidden) => {
            warn!(channel_id, "cannot read channel history, a new panel will be posted");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

async fn write_panel<S: ChatSink>(
    sink: &S,
    store: &mut RecordStore,
    id: u64,
    channel_id: u64,
    target: Option<u64>,
    panel: &PanelEmbed,
) -> Result<PanelOutcome, WriteError> {
    match target {
        Some(message_id) => {
            let edited = with_rate_limit_retry("edit panel", move || {
                sink.edit_message(channel_id, message_id, panel)
            })
            .await;
            match edited {
                Ok(_) => {
                    info!(target_id = id, message_id, "panel updated");
                    Ok(PanelOutcome::Edited)
                }
                Err(SinkError::NotFound) => {
                    store.update(id, |r| r.message_id = None)?;
                    Err(SinkError::NotFound.into())
                }
                Err(err) => Err(err.into()),
            }
        }
        None => {
            let sent =
                with_rate_limit_retry("send panel", move || sink.send_message(channel_id, panel))
                    .await?;
            store.update(id, |r| r.message_id = Some(sent.id))?;
            info!(target_id = id, message_id = sent.id, channel_id, "panel posted");
            Ok(PanelOutcome::Created)
        }
    }
}

/// Deletes the tracked panel message if there is one. Failures are logged, never returned.
pub async fn delete_panel<S: ChatSink>(sink: &S, record: &ServerRecord) -> bool {
    let (Some(channel_id), Some(message_id)) = (record.text_channel_id, record.message_id) else {
        return false;
    };
    let deleted =
        with_rate_limit_retry("delete panel", move || sink.delete_message(channel_id, message_id))
            .await;
    match deleted {
        Ok(()) => {
            info!(target_id = record.id, message_id, "panel deleted");
            true
        }
        Err(SinkError::NotFound) => {
            debug!(target_id = record.id, message_id, "panel already gone");
            false
        }
        Err(err) => {
            warn!(target_id = record.id, message_id, error = %err, "could not delete panel");
            false
        }
    }
}

/// Renames the target's voice channel when the status-derived label differs from the live name.
pub async fn sync_voice_name<S: ChatSink>(
    sink: &S,
    record: &ServerRecord,
    status: &ServerStatus,
    max_chars: usize,
) -> Result<VoiceOutcome, WriteError> {
    if !record.update_name {
        return Ok(VoiceOutcome::Disabled);
    }
    let Some(channel_id) = record.voice_channel_id else {
        return Ok(VoiceOutcome::NotConfigured);
    };

    let channel = sink.fetch_channel(channel_id).await?;
    if channel.kind != ChannelKind::Voice {
        return Err(WriteError::WrongChannelKind {
            channel_id,
            expected: ChannelKind::Voice,
        });
    }

    let name = voice_channel_name(record, status, max_chars);
    if channel.name == name {
        debug!(target_id = record.id, channel_id, "voice name unchanged, skipping rename");
        return Ok(VoiceOutcome::Unchanged);
    }

    let label = name.as_str();
    with_rate_limit_retry("rename voice channel", move || {
        sink.rename_channel(channel_id, label)
    })
    .await?;
    info!(target_id = record.id, channel_id, name = %name, "voice channel renamed");
    Ok(VoiceOutcome::Renamed)
}
