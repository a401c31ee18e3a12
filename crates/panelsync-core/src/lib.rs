pub mod a2s;
pub mod cache;
pub mod commands;
pub mod config;
pub mod discord;
pub mod querier;
pub mod record;
pub mod render;
pub mod scheduler;
pub mod sink;
pub mod status;
pub mod store;
pub mod synchronizer;
pub mod throttle;
pub mod writer;

#[cfg(test)]
mod testing;

pub use a2s::{A2sClient, QueryError, ServerQuery};
pub use commands::{CommandError, ConfigChange, Customization, ImageChange};
pub use config::SyncConfig;
pub use discord::{DiscordSink, DEFAULT_API_BASE};
pub use record::{Layout, ServerRecord};
pub use render::{render_panel, voice_channel_name, PanelEmbed};
pub use scheduler::Control;
pub use sink::{ChannelKind, ChatSink, SinkError};
pub use status::ServerStatus;
pub use store::{RecordStore, StoreError};
pub use synchronizer::{CycleReport, Synchronizer, TargetOutcome};
pub use writer::{PanelOutcome, VoiceOutcome, WriteError};
