//! Busy Bar terminal remote, entry point.
//!
//! ```text
//! busy-remote                          Mirror the front display of 10.0.4.20
//! busy-remote --addr 192.168.1.40 -d 1 Mirror the back display
//! busy-remote --config <path>          Use custom config TOML
//! busy-remote --gen-config             Dump default config and exit
//! ```

use std::fs::OpenOptions;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use busy_core::{
    AsyncRunner, DisplaySpec, HttpConnector, KeyMap, Orchestrator, SessionOptions,
};

use busy_remote::config::RemoteConfig;
use busy_remote::stdin;
use busy_remote::terminal::{RenderOptions, TerminalGuard, TerminalRenderer};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "busy-remote", about = "Mirror a Busy Bar display in the terminal")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "busy-remote.toml")]
    config: PathBuf,

    /// Device address (overrides config). Example: 10.0.4.20
    #[arg(short, long)]
    addr: Option<String>,

    /// API token (overrides config and environment).
    #[arg(short, long)]
    token: Option<String>,

    /// Display to mirror: front, back, 0 or 1.
    #[arg(short, long)]
    display: Option<String>,

    /// Poll /api/screen every N seconds instead of streaming (0 disables).
    #[arg(long)]
    http_poll_interval: Option<f64>,

    /// String inserted between pixels.
    #[arg(long)]
    spacer: Option<String>,

    /// Symbol drawn for a lit pixel.
    #[arg(long)]
    pixel_char: Option<String>,

    /// JSON keymap file.
    #[arg(long)]
    keymap_file: Option<String>,

    /// Command history file ("" keeps history in memory).
    #[arg(long)]
    history_file: Option<String>,

    /// Do not forward keys to /api/input.
    #[arg(long)]
    no_send_input: bool,

    /// Log level (RUST_LOG wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Log file path.
    #[arg(long)]
    log_file: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

impl Cli {
    fn apply(self, config: &mut RemoteConfig) {
        if let Some(addr) = self.addr {
            config.device.addr = addr;
        }
        if let Some(token) = self.token {
            config.device.token = token;
        }
        if let Some(display) = self.display {
            config.stream.display = display;
        }
        if let Some(interval) = self.http_poll_interval {
            config.stream.http_poll_interval = interval;
        }
        if let Some(spacer) = self.spacer {
            config.render.spacer = spacer;
        }
        if let Some(pixel_char) = self.pixel_char {
            config.render.pixel_char = pixel_char;
        }
        if let Some(keymap_file) = self.keymap_file {
            config.input.keymap_file = keymap_file;
        }
        if let Some(history_file) = self.history_file {
            config.input.history_file = history_file;
        }
        if self.no_send_input {
            config.input.send_input = false;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(file) = self.log_file {
            config.logging.file = file;
        }
    }
}

// ── Token resolution ─────────────────────────────────────────────

fn is_private_host(addr: &str) -> bool {
    let host = addr.split("://").last().unwrap_or(addr);
    let host = host.split(['/', ':']).next().unwrap_or(host);
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_private() || ip.is_loopback(),
        Ok(IpAddr::V6(ip)) => ip.is_loopback(),
        Err(_) => host.ends_with(".local") || host.starts_with("localhost"),
    }
}

/// Explicit token, else `BUSY_LAN_TOKEN` for private hosts, else
/// `BUSY_CLOUD_TOKEN`.
fn pick_token(
    explicit: Option<&str>,
    addr: Option<&str>,
    lan: Option<String>,
    cloud: Option<String>,
) -> Option<String> {
    if let Some(token) = explicit {
        return Some(token.to_string());
    }
    let lan_host = addr.is_none_or(is_private_host);
    let lan = if lan_host { lan } else { None };
    lan.or(cloud).filter(|t| !t.is_empty())
}

fn help_lines(keymap: &KeyMap) -> Vec<String> {
    let mut lines = vec![" Keys".to_string()];
    lines.extend(
        keymap
            .help_entries()
            .into_iter()
            .map(|(label, key)| format!("  {label:<12} {key}")),
    );
    lines.push(format!("  {:<12} switch display", "tab/ctrl+r"));
    lines.push(format!("  {:<12} command line", ":"));
    lines.push(format!("  {:<12} toggle help", "h"));
    lines.push(format!("  {:<12} quit", "ctrl+q"));
    lines
}

// ── Main ─────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        println!("{}", RemoteConfig::default_toml()?);
        return Ok(());
    }

    // The terminal is still in cooked mode here, so config errors go to stderr.
    let mut config = match RemoteConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("busy-remote: {}: {e}", cli.config.display());
            return Err(e.into());
        }
    };
    let config_path = cli.config.clone();
    cli.apply(&mut config);

    // Init tracing into the log file; the terminal belongs to the mirror.
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.logging.file)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .init();

    info!("busy-remote v{}", env!("CARGO_PKG_VERSION"));
    info!("config {}", config_path.display());

    // ── 1. Resolve settings ─────────────────────────────────────

    let token = pick_token(
        config.device.token(),
        config.device.addr(),
        std::env::var("BUSY_LAN_TOKEN").ok(),
        std::env::var("BUSY_CLOUD_TOKEN").ok(),
    );
    let connector = HttpConnector::new(config.device.addr(), token, config.device.timeout());
    info!(
        "device {} ({:?})",
        connector.base_url(),
        connector.connection()
    );

    let keymap = KeyMap::load(config.input.keymap_file())?;
    let display = DisplaySpec::resolve(Some(config.stream.display.as_str()))?;
    let options = SessionOptions {
        display,
        poll_interval: config.stream.poll_interval(),
        periodic: config.stream.periodic(),
        key_timeout: config.stream.key_timeout(),
        send_input: config.input.send_input,
        history_file: config.input.history_file().map(PathBuf::from),
    };

    let renderer = Arc::new(TerminalRenderer::stdout(
        RenderOptions {
            spacer: config.render.spacer.clone(),
            pixel_char: config.render.pixel_char.clone(),
        },
        help_lines(&keymap),
    ));
    let orchestrator = Orchestrator::new(Arc::new(connector), renderer, keymap, options);

    // ── 2. Start the runtime thread and the terminal ────────────

    let mut runner = AsyncRunner::start("busy-stream")?;
    let guard = TerminalGuard::enter()?;
    let (mut keys, _reader) = stdin::spawn(32)?;

    // ── 3. Stream until quit ────────────────────────────────────

    let result = runner.run(async move { orchestrator.run(&mut keys).await });

    // ── 4. Shutdown ─────────────────────────────────────────────

    drop(guard);
    runner.stop();

    match result {
        Ok(Ok(())) => {
            info!("stopped");
            Ok(())
        }
        Ok(Err(e)) | Err(e) => {
            error!("stream failed: {e}");
            eprintln!("busy-remote: {e}");
            Err(e.into())
        }
    }
}
