use panelsync_core::{
    ConfigChange, PanelOutcome, ServerRecord, ServerStatus, TargetOutcome, VoiceOutcome,
};

fn channel_label(channel: Option<u64>) -> String {
    channel.map_or_else(|| "-".to_string(), |id| id.to_string())
}

pub fn record_lines(record: &ServerRecord) -> Vec<String> {
    let (online, max) = record.last_online;
    vec![
        format!("#{} {}", record.id, record.name),
        format!("  Query:      {}:{}", record.ip, record.port),
        format!("  Display:    {}", record.display_addr()),
        format!("  Online:     {online}/{max} (last known)"),
        format!(
            "  Channels:   text={} voice={} panel={}",
            channel_label(record.text_channel_id),
            channel_label(record.voice_channel_id),
            channel_label(record.message_id),
        ),
        format!(
            "  Design:     {} color=#{} rename={}",
            record.design.label(),
            record.embed_color,
            record.update_name
        ),
    ]
}

pub fn status_lines(record: &ServerRecord, status: &ServerStatus) -> Vec<String> {
    let mut lines = vec![
        format!("Server:     {}", status.name),
        format!("Map:        {}", status.map),
        format!("Online:     {}/{}", status.online, status.max),
        format!("Query addr: {}:{}", record.ip, record.port),
    ];
    if record.display_port() != record.port {
        lines.push(format!("Shown as:   {}", record.display_addr()));
    }
    lines
}

fn panel_label(panel: &PanelOutcome) -> &'static str {
    match panel {
        PanelOutcome::NotConfigured => "no text channel",
        PanelOutcome::Unchanged => "unchanged",
        PanelOutcome::Edited => "edited",
        PanelOutcome::Created => "posted",
    }
}

fn voice_label(voice: &VoiceOutcome) -> &'static str {
    match voice {
        VoiceOutcome::NotConfigured => "no voice channel",
        VoiceOutcome::Disabled => "rename disabled",
        VoiceOutcome::Unchanged => "unchanged",
        VoiceOutcome::Renamed => "renamed",
    }
}

pub fn outcome_lines(id: u64, outcome: &TargetOutcome) -> Vec<String> {
    match outcome {
        TargetOutcome::Unreachable(reason) => vec![format!("#{id} unreachable: {reason}")],
        TargetOutcome::Synced { status, panel, voice } => vec![
            format!("#{id} online {}/{}", status.online, status.max),
            match panel {
                Ok(p) => format!("  Panel:      {}", panel_label(p)),
                Err(err) => format!("  Panel:      failed ({err})"),
            },
            match voice {
                Ok(v) => format!("  Voice:      {}", voice_label(v)),
                Err(err) => format!("  Voice:      failed ({err})"),
            },
        ],
    }
}

pub fn change_lines(id: u64, change: &ConfigChange) -> Vec<String> {
    let mut lines = vec![format!("#{id} updated")];
    if change.changes.is_empty() {
        lines.push("  (nothing changed)".to_string());
    }
    lines.extend(change.changes.iter().map(|c| format!("  {c}")));
    lines.push(match &change.panel {
        None => "  Panel:      not refreshed, target unreachable".to_string(),
        Some(Ok(p)) => format!("  Panel:      {}", panel_label(p)),
        Some(Err(err)) => format!("  Panel:      failed ({err})"),
    });
    lines
}
