use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const DEFAULT_TITLE: &str = "📊 {name}";
pub const DEFAULT_COLOR: &str = "00FF00";
pub const DEFAULT_FOOTER: &str = "Updated";

/// Panel layout variant. Legacy files spell these `old` and `new`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    #[serde(alias = "old")]
    Compact,
    #[serde(alias = "new")]
    Vertical,
}

impl Layout {
    pub fn label(self) -> &'static str {
        match self {
            Layout::Compact => "compact",
            Layout::Vertical => "vertical",
        }
    }
}

/// One monitored target as persisted in the store file.
///
/// The identifier is the key of the persisted object, so it is not part of the value.
/// Fields this version does not know about are kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    #[serde(skip)]
    pub id: u64,
    pub ip: String,
    pub port: u16,
    pub display_port: Option<u16>,
    pub name: String,
    pub text_channel_id: Option<u64>,
    pub voice_channel_id: Option<u64>,
    pub last_online: (u32, u32),
    pub embed_title: String,
    pub embed_color: String,
    pub update_name: bool,
    pub message_id: Option<u64>,
    pub show_progress: bool,
    pub show_map: bool,
    pub show_address: bool,
    pub thumbnail_url: Option<String>,
    pub footer_text: String,
    pub design: Layout,
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServerRecord {
    pub fn new(
        id: u64,
        ip: impl Into<String>,
        port: u16,
        name: impl Into<String>,
        display_port: Option<u16>,
    ) -> Self {
        Self {
            id,
            ip: ip.into(),
            port,
            display_port: Some(display_port.unwrap_or(port)),
            name: name.into(),
            text_channel_id: None,
            voice_channel_id: None,
            last_online: (0, 0),
            embed_title: DEFAULT_TITLE.to_string(),
            embed_color: DEFAULT_COLOR.to_string(),
            update_name: true,
            message_id: None,
            show_progress: true,
            show_map: true,
            show_address: true,
            thumbnail_url: None,
            footer_text: DEFAULT_FOOTER.to_string(),
            design: Layout::Compact,
            image_url: None,
            extra: Map::new(),
        }
    }

    pub fn query_addr(&self) -> (&str, u16) {
        (&self.ip, self.port)
    }

    pub fn display_port(&self) -> u16 {
        self.display_port.unwrap_or(self.port)
    }

    pub fn display_addr(&self) -> String {
        format!("{}:{}", self.ip, self.display_port())
    }

    /// Configured panel color; malformed values fall back to the default green.
    pub fn color(&self) -> u32 {
        parse_hex_color(&self.embed_color).unwrap_or(0x00FF00)
    }
}

pub fn parse_hex_color(raw: &str) -> Option<u32> {
    let raw = raw.trim_start_matches('#');
    if raw.len() != 6 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(raw, 16).ok()
}

/// Values given to fields missing from older store files.
fn field_defaults() -> [(&'static str, Value); 18] {
    [
        ("ip", json!("")),
        ("port", json!(0)),
        ("display_port", Value::Null),
        ("name", json!("")),
        ("text_channel_id", Value::Null),
        ("voice_channel_id", Value::Null),
        ("last_online", json!([0, 0])),
        ("embed_title", json!(DEFAULT_TITLE)),
        ("embed_color", json!(DEFAULT_COLOR)),
        ("update_name", json!(true)),
        ("message_id", Value::Null),
        ("show_progress", json!(true)),
        ("show_map", json!(true)),
        ("show_address", json!(true)),
        ("thumbnail_url", Value::Null),
        ("footer_text", json!(DEFAULT_FOOTER)),
        ("design", json!("compact")),
        ("image_url", Value::Null),
    ]
}

/// Inserts defaults for every schema field absent from `raw`, returning the names that were added.
/// Present fields, including unknown ones, are left as they are.
pub fn backfill_defaults(raw: &mut Map<String, Value>) -> Vec<&'static str> {
    let mut added = Vec::new();
    for (key, default) in field_defaults() {
        if !raw.contains_key(key) {
            raw.insert(key.to_string(), default);
            added.push(key);
        }
    }
    added
}
