//! cmux-daemon - owns pseudo-console sessions for the cmux UI.
//!
//! This is the daemon binary entry point. See the `cmux` library for
//! the engine itself. The daemon runs until Ctrl-C / SIGTERM, keeping
//! sessions alive across UI restarts; clients reconnect over the local
//! endpoint and re-attach by pane id.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;

use cmux::daemon::{endpoint_name, Daemon};
use cmux::history::transcript::TranscriptStore;
use cmux::history::CommandLog;
use cmux::session::manager::SessionManager;
use cmux::Config;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(
    name = "cmux-daemon",
    version,
    about = "Terminal session daemon for cmux"
)]
struct Cli {
    /// Endpoint base name (default: cmux-daemon, or CMUX_ENDPOINT).
    #[arg(long)]
    endpoint: Option<String>,

    /// Scrollback lines per pane.
    #[arg(long)]
    scrollback: Option<usize>,

    /// Days to keep command logs and transcripts (0 = forever).
    #[arg(long)]
    retention_days: Option<i64>,

    /// Log to stderr instead of the daemon log file.
    #[arg(long)]
    foreground: bool,
}

/// Route logs to `{data}/logs/daemon.log` unless running in the
/// foreground; a service process has no useful stderr.
fn init_logging(foreground: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if !foreground {
        let log_path = cmux::config::default_data_dir().join("logs").join("daemon.log");
        let log_file = log_path.parent().and_then(|dir| {
            std::fs::create_dir_all(dir).ok()?;
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .ok()
        });
        match log_file {
            Some(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            None => eprintln!(
                "Warning: cannot open {}; logging to stderr",
                log_path.display()
            ),
        }
    }
    builder.init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.foreground);

    let mut config = Config::load().context("load configuration")?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(scrollback) = cli.scrollback {
        config.scrollback_lines = scrollback;
    }
    if let Some(days) = cli.retention_days {
        config.retention_days = days;
    }

    log::info!(
        "cmux-daemon starting (endpoint {}, data dir {})",
        config.endpoint,
        config.data_dir.display()
    );

    let command_log = Arc::new(CommandLog::new(config.log_dir(), config.retention_days));
    let transcripts = Arc::new(TranscriptStore::new(&config.data_dir, config.retention_days));
    command_log.sweep_retention();
    transcripts.sweep_retention();

    let (manager, events_rx) = SessionManager::new(config.scrollback_lines);
    let manager = Arc::new(manager);

    let name = endpoint_name(&config.endpoint)
        .with_context(|| format!("resolve endpoint {}", config.endpoint))?;
    let daemon = Daemon::start(
        name,
        Arc::clone(&manager),
        events_rx,
        command_log,
        transcripts,
    )
    .context("start daemon")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("install shutdown handler")?;
    }

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    daemon.shutdown();
    daemon.join();
    log::info!("cmux-daemon stopped");
    Ok(())
}
