use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use pipelog_logs::{LogService, LogSink};
use pipelog_transport::{DEFAULT_CHANNEL_NAME, LogClient, ServerConfig};
use pipelog_tui::{
    AppState, Event, EventHandler, HelpOverlay, KeyBindings, KeyContext, LogViewerScreen, Tui,
    install_panic_hook,
};
use pipelog_types::{DisplayLogEntry, LevelFlags, LogLevel};

mod config;

use config::{FileConfig, Overrides, Settings};

/// pipelog - collect diagnostic records sent over a local named pipe
#[derive(Parser, Debug)]
#[command(name = "pipelog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Diagnostics filter for pipelog itself (RUST_LOG syntax)
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Listen on a channel and show incoming records
    Listen(ListenArgs),
    /// Send one record to a listening collector
    Send(SendArgs),
}

#[derive(Args, Debug)]
struct ListenArgs {
    /// Channel name, or a socket path when it contains '/'
    #[arg(long)]
    channel: Option<String>,

    /// Initially visible levels, e.g. "warning,error" or "all"
    #[arg(long)]
    levels: Option<LevelFlags>,

    /// Print records to stdout instead of opening the viewer
    #[arg(long)]
    plain: bool,

    /// Give up on a connection that has not sent a full record in time
    #[arg(long, value_name = "MS")]
    read_timeout_ms: Option<u64>,

    /// Config file to use instead of the per-user one
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write pipelog's own diagnostics to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Channel name, or a socket path when it contains '/'
    #[arg(long)]
    channel: Option<String>,

    /// Record level: info, warning or error
    #[arg(long, default_value = "info", value_parser = parse_level)]
    level: LogLevel,

    /// Source file reported with the record
    #[arg(long, default_value = "")]
    file: String,

    /// Source function reported with the record
    #[arg(long, default_value = "")]
    function: String,

    /// Source line reported with the record
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    line: i32,

    /// Config file to use instead of the per-user one
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Message text
    message: String,
}

fn parse_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::from_name(s).ok_or_else(|| format!("unknown level '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Listen(args) => listen(args, cli.log_level.as_deref()).await,
        Command::Send(args) => send(args, cli.log_level.as_deref()).await,
    };

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

/// Install the fmt subscriber. The viewer owns the terminal, so in that mode
/// diagnostics go to `log_file` or nowhere.
fn init_tracing(log_level: Option<&str>, log_file: Option<&Path>, tui: bool) -> Result<()> {
    let filter = match log_level {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid --log-level '{}'", directives))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None if tui => BoxMakeWriter::new(io::sink),
        None => BoxMakeWriter::new(io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none() && !tui)
        .init();

    Ok(())
}

async fn listen(args: ListenArgs, log_level: Option<&str>) -> Result<()> {
    init_tracing(log_level, args.log_file.as_deref(), !args.plain)?;

    let file = FileConfig::load(args.config.as_deref())?;
    let settings = Settings::resolve(
        file,
        Overrides {
            channel: args.channel,
            read_timeout_ms: args.read_timeout_ms,
            levels: args.levels,
        },
    )?;

    let sink = LogSink::with_filter(settings.levels);
    let server_config =
        ServerConfig::new(&settings.channel).with_read_timeout(settings.read_timeout);
    let mut service = LogService::start(&server_config, sink.clone())
        .with_context(|| format!("failed to listen on channel '{}'", settings.channel))?;

    let result = if args.plain {
        run_plain(&sink).await
    } else {
        run_viewer(&sink, service.endpoint(), settings.export_dir).await
    };

    service.stop().await;
    let stats = service.server_stats();
    tracing::info!(
        accepted = stats.accepted,
        received = stats.received,
        empty = stats.empty,
        failed = stats.failed,
        "Collector stopped"
    );

    result
}

async fn send(args: SendArgs, log_level: Option<&str>) -> Result<()> {
    init_tracing(log_level, None, false)?;

    let file = FileConfig::load(args.config.as_deref())?;
    let channel = args
        .channel
        .or(file.channel)
        .unwrap_or_else(|| DEFAULT_CHANNEL_NAME.to_string());

    LogClient::new(&channel)
        .emit(args.level, args.message, args.file, args.function, args.line)
        .await
        .with_context(|| format!("failed to send to channel '{}'", channel))
}

fn print_entry(out: &mut impl Write, entry: &DisplayLogEntry) -> io::Result<()> {
    writeln!(
        out,
        "{} [{}] {} | {}",
        entry.captured_at.format("%H:%M:%S%.3f"),
        entry.severity(),
        entry.label,
        entry.message
    )
}

/// Print visible entries as they arrive until Ctrl-C
async fn run_plain(sink: &LogSink) -> Result<()> {
    let mut events = sink.subscribe();
    let mut last_printed: Option<u64> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            event = events.recv() => match event {
                Ok(_) | Err(RecvError::Lagged(_)) => {
                    let entries = sink.visible_since(last_printed);
                    let mut out = io::stdout().lock();
                    for entry in &entries {
                        print_entry(&mut out, entry)?;
                    }
                    out.flush()?;
                    if let Some(entry) = entries.last() {
                        last_printed = Some(entry.id);
                    }
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

async fn run_viewer(sink: &LogSink, endpoint: &str, export_dir: PathBuf) -> Result<()> {
    install_panic_hook();

    let mut tui = Tui::new().context("failed to initialize terminal")?;
    let mut events = EventHandler::new(Duration::from_millis(250), sink.subscribe());
    let keybindings = KeyBindings::new();
    let mut state = AppState::new(endpoint, export_dir);

    loop {
        if state.render_dirty {
            tui.draw(|frame| {
                LogViewerScreen::render(frame, &mut state, sink);
                if state.ui_state.help_visible {
                    HelpOverlay::render(frame);
                }
            })?;
            state.render_dirty = false;
        }

        let event = tokio::select! {
            event = events.next() => event,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(event) = event else {
            break;
        };

        match event {
            Event::Key(key) => {
                let action = if state.ui_state.search_active {
                    keybindings.get_filter_input_action(&key)
                } else {
                    keybindings.get_action(KeyContext::LogViewer, &key)
                };
                if let Some(action) = action {
                    state.apply(action, sink);
                }
            }
            Event::Sink(sink_event) => state.on_sink_event(&sink_event),
            Event::SinkLagged(skipped) => {
                tracing::debug!(skipped, "Viewer lagged behind sink events");
                state.ui_state.filter_cache.invalidate();
                state.render_dirty = true;
            }
            Event::Resize(_, _) => state.render_dirty = true,
            Event::Error(e) => {
                state.message = Some(e);
                state.render_dirty = true;
            }
            Event::Tick => {}
        }

        if state.should_quit {
            break;
        }
    }

    events.shutdown().await;
    tui.restore()?;

    Ok(())
}
