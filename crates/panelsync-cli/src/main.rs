use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use panelsync_core::scheduler;
use panelsync_core::{
    A2sClient, ChannelKind, Control, Customization, DiscordSink, ImageChange, Layout, RecordStore,
    SyncConfig, Synchronizer, DEFAULT_API_BASE,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod report;

#[derive(Debug, Parser)]
#[command(name = "panelsyncd")]
#[command(about = "Keeps Discord status panels and voice channel names in sync with game servers")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value = "./servers.json")]
    config: PathBuf,

    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[arg(long, default_value = DEFAULT_API_BASE)]
    api_base: String,

    #[arg(long, default_value_t = 60)]
    interval_secs: u64,

    #[arg(long, default_value_t = 2000)]
    pause_ms: u64,

    #[arg(long, default_value_t = 5000)]
    query_timeout_ms: u64,

    #[arg(long, default_value_t = 30)]
    cache_ttl_secs: u64,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Synchronize every target until ctrl-c. SIGHUP clears the query cache.
    Run,
    Add {
        host: String,
        port: u16,
        name: String,
        #[arg(long)]
        display_port: Option<u16>,
    },
    Remove {
        id: u64,
    },
    List,
    Test {
        id: u64,
    },
    Refresh {
        id: u64,
    },
    SetChannel {
        id: u64,
        kind: ChannelArg,
        channel_id: u64,
    },
    Customize {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        show_progress: Option<bool>,
        #[arg(long)]
        show_map: Option<bool>,
        #[arg(long)]
        show_address: Option<bool>,
        #[arg(long)]
        display_port: Option<u16>,
        #[arg(long)]
        thumbnail_url: Option<String>,
        #[arg(long)]
        footer_text: Option<String>,
        #[arg(long)]
        update_name: Option<bool>,
    },
    Design {
        id: u64,
        layout: LayoutArg,
        #[arg(long, conflicts_with = "reset_image")]
        image_url: Option<String>,
        #[arg(long)]
        reset_image: bool,
    },
    Preview {
        id: u64,
        #[arg(long, value_enum)]
        design: Option<LayoutArg>,
    },
    RecreatePanel {
        id: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ChannelArg {
    Text,
    Voice,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LayoutArg {
    Compact,
    Vertical,
}

impl From<ChannelArg> for ChannelKind {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Text => ChannelKind::Text,
            ChannelArg::Voice => ChannelKind::Voice,
        }
    }
}

impl From<LayoutArg> for Layout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Compact => Layout::Compact,
            LayoutArg::Vertical => Layout::Vertical,
        }
    }
}

impl Command {
    /// Read-only commands work on an unlocked snapshot, so they can run next to the daemon.
    fn read_only(&self) -> bool {
        matches!(self, Command::List | Command::Test { .. } | Command::Preview { .. })
    }

    fn needs_token(&self) -> bool {
        !self.read_only() && !matches!(self, Command::Add { .. })
    }
}

fn open_store(path: &Path, read_only: bool) -> Result<RecordStore> {
    let store = if read_only {
        RecordStore::snapshot(path)
    } else {
        RecordStore::load(path)
    };
    store.with_context(|| format!("opening {}", path.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let config = SyncConfig {
        cycle_interval: Duration::from_secs(cli.interval_secs),
        target_pause: Duration::from_millis(cli.pause_ms),
        query_timeout: Duration::from_millis(cli.query_timeout_ms),
        cache_ttl: Duration::from_secs(cli.cache_ttl_secs),
        ..SyncConfig::default()
    };

    let store = open_store(&cli.config, cli.command.read_only())?;

    if let Command::List = cli.command {
        print_list(&store);
        return Ok(());
    }

    let token = match (cli.token, cli.command.needs_token()) {
        (Some(token), _) => token,
        (None, false) => String::new(),
        (None, true) => bail!("a bot token is required: pass --token or set DISCORD_TOKEN"),
    };
    let sink = DiscordSink::new(token, cli.api_base).context("creating discord client")?;
    let mut sync = Synchronizer::new(store, A2sClient::new(), sink, config);

    match cli.command {
        Command::Run => run_daemon(&mut sync).await?,
        Command::List => print_list(sync.store()),
        Command::Add {
            host,
            port,
            name,
            display_port,
        } => {
            let (id, first_status) = sync.add_target(&host, port, &name, display_port).await?;
            println!("Added #{id} {name} ({host}:{port})");
            match first_status {
                Some(status) => println!("Online:     {}/{}", status.online, status.max),
                None => println!("Online:     unreachable"),
            }
        }
        Command::Remove { id } => {
            let record = sync.remove_target(id).await?;
            println!("Removed #{id} {} ({}:{})", record.name, record.ip, record.port);
        }
        Command::Test { id } => {
            let status = sync.test_target(id).await?;
            let record = sync.store().get(id)?;
            print_lines(&report::status_lines(record, &status));
        }
        Command::Refresh { id } => {
            let outcome = sync.refresh_target(id).await?;
            print_lines(&report::outcome_lines(id, &outcome));
            if outcome.failed() {
                bail!("refresh of #{id} did not complete");
            }
        }
        Command::SetChannel { id, kind, channel_id } => {
            sync.set_channel(id, kind.into(), channel_id).await?;
            println!("#{id} {kind:?} channel set to {channel_id}");
        }
        Command::Customize {
            id,
            title,
            color,
            show_progress,
            show_map,
            show_address,
            display_port,
            thumbnail_url,
            footer_text,
            update_name,
        } => {
            let custom = Customization {
                title,
                color,
                show_progress,
                show_map,
                show_address,
                display_port,
                thumbnail_url,
                footer_text,
                update_name,
            };
            let change = sync.customize(id, custom).await?;
            print_lines(&report::change_lines(id, &change));
        }
        Command::Design {
            id,
            layout,
            image_url,
            reset_image,
        } => {
            let image = match (image_url, reset_image) {
                (Some(url), _) => ImageChange::Set(url),
                (None, true) => ImageChange::Reset,
                (None, false) => ImageChange::Keep,
            };
            let change = sync.set_design(id, layout.into(), image).await?;
            print_lines(&report::change_lines(id, &change));
        }
        Command::Preview { id, design } => {
            let panel = sync.preview(id, design.map(Layout::from)).await?;
            println!("{}", serde_json::to_string_pretty(&panel)?);
        }
        Command::RecreatePanel { id } => {
            let message_id = sync.recreate_panel(id).await?;
            println!("#{id} panel posted as message {message_id}");
        }
    }

    Ok(())
}

async fn run_daemon(sync: &mut Synchronizer<A2sClient, DiscordSink>) -> Result<()> {
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        if let Err(err) = forward_signals(tx).await {
            warn!(error = %err, "signal handling stopped");
        }
    });

    let cycles = scheduler::run(sync, rx).await;
    info!(cycles, "daemon stopped");
    Ok(())
}

#[cfg(unix)]
async fn forward_signals(tx: mpsc::Sender<Control>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("waiting for ctrl-c")?;
                warn!("received ctrl-c, stopping after the current cycle");
                let _ = tx.send(Control::Shutdown).await;
                return Ok(());
            }
            _ = hangup.recv() => {
                info!("received SIGHUP, clearing query cache");
                if tx.send(Control::ClearCache).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn forward_signals(tx: mpsc::Sender<Control>) -> Result<()> {
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    warn!("received ctrl-c, stopping after the current cycle");
    let _ = tx.send(Control::Shutdown).await;
    Ok(())
}

fn print_list(store: &RecordStore) {
    if store.is_empty() {
        println!("No servers configured.");
        return;
    }
    println!("=== {} server(s) ===", store.len());
    for record in store.list() {
        print_lines(&report::record_lines(record));
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}
