use serde::{Deserialize, Serialize};

use crate::record::{Layout, ServerRecord};
use crate::status::ServerStatus;

const COMPACT_BAR_LEN: usize = 10;
const VERTICAL_BAR_LEN: usize = 15;
const VOICE_NAME_CHARS: usize = 15;
const EMPTY_COLOR: u32 = 0xFF5555;
const LOW_COLOR: u32 = 0xFFAA00;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Rendered panel content. The platform adds its own timestamp, which is not part of the
/// projection and never takes part in change detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelEmbed {
    pub title: String,
    pub description: Option<String>,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub thumbnail_url: Option<String>,
    pub image_url: Option<String>,
    pub footer: Option<String>,
}

impl PanelEmbed {
    fn field(&mut self, name: &str, value: impl Into<String>, inline: bool) {
        self.fields.push(EmbedField {
            name: name.to_string(),
            value: value.into(),
            inline,
        });
    }

    /// Plain text of everything a reader sees, used for previews and diagnostics.
    pub fn text(&self) -> String {
        let mut out = vec![self.title.clone()];
        out.extend(self.description.clone());
        for f in &self.fields {
            out.push(format!("{}: {}", f.name, f.value));
        }
        out.extend(self.footer.clone());
        out.join("\n")
    }
}

pub fn render_panel(record: &ServerRecord, status: &ServerStatus) -> PanelEmbed {
    match record.design {
        Layout::Compact => render_compact(record, status),
        Layout::Vertical => render_vertical(record, status),
    }
}

fn render_title(template: &str, record: &ServerRecord, status: &ServerStatus) -> String {
    template
        .replace("{name}", &record.name)
        .replace("{online}", &status.online.to_string())
        .replace("{max}", &status.max.to_string())
        .replace("{map}", &status.map)
}

fn progress_bar(status: &ServerStatus, len: usize) -> Option<(String, f64)> {
    let ratio = status.fill_ratio()?;
    let filled = ((len as f64 * ratio) as usize).min(len);
    let bar = "█".repeat(filled) + &"░".repeat(len - filled);
    Some((bar, ratio * 100.0))
}

fn render_compact(record: &ServerRecord, status: &ServerStatus) -> PanelEmbed {
    let mut panel = PanelEmbed {
        title: render_title(&record.embed_title, record, status),
        color: record.color(),
        thumbnail_url: record.thumbnail_url.clone(),
        footer: Some(format!("{} • 🆔: {}", record.footer_text, record.id)),
        ..PanelEmbed::default()
    };

    let occupancy = format!("**{}**/{}", status.online, status.max);
    match progress_bar(status, COMPACT_BAR_LEN).filter(|_| record.show_progress) {
        Some((bar, pct)) => {
            panel.field("👥 Online", occupancy, true);
            panel.field("📊 Fill", format!("{bar} {pct:.1}%"), true);
        }
        None => panel.field("👥 Online", occupancy, record.show_progress),
    }

    if record.show_map && !status.map.is_empty() {
        panel.field("🗺️ Map", status.map.clone(), false);
    }
    if record.show_address {
        panel.field("🌐 Address", record.display_addr(), false);
    }

    panel
}

fn render_vertical(record: &ServerRecord, status: &ServerStatus) -> PanelEmbed {
    let color = if status.online == 0 {
        EMPTY_COLOR
    } else if (status.online as f64) < status.max as f64 * 0.5 {
        LOW_COLOR
    } else {
        record.color()
    };

    let mut panel = PanelEmbed {
        title: format!("🎮 {}", record.name),
        color,
        image_url: record
            .image_url
            .clone()
            .or_else(|| record.thumbnail_url.clone()),
        footer: Some(record.footer_text.clone()),
        ..PanelEmbed::default()
    };

    if record.show_address {
        panel.field("🌐 IP address", record.display_addr(), false);
    }

    let mut online = format!("**{} / {}**", status.online, status.max);
    if record.show_progress {
        if let Some((bar, pct)) = progress_bar(status, VERTICAL_BAR_LEN) {
            online.push_str(&format!("\n`{bar}` {pct:.1}%"));
        }
    }
    panel.field("👥 Online", online, false);

    if record.show_map && !status.map.is_empty() {
        panel.field("🗺️ Map", status.map.clone(), false);
    }

    panel
}

/// Voice channel label: presence glyph, occupancy and a shortened display name,
/// cut to `max_chars` characters.
pub fn voice_channel_name(
    record: &ServerRecord,
    status: &ServerStatus,
    max_chars: usize,
) -> String {
    let glyph = if status.online > 0 { "🟢" } else { "🔴" };
    let short: String = record.name.chars().take(VOICE_NAME_CHARS).collect();
    format!("{glyph} {}/{} | {short}", status.online, status.max)
        .chars()
        .take(max_chars)
        .collect()
}
