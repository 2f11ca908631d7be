pub mod config;
pub mod engine;
pub mod events;
pub mod overlay;
pub mod stats;
pub mod store;
pub mod tailer;
pub mod tracker;
pub mod watcher;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::TimerConfig;
use engine::NpcTimer;
use events::GameEvent;
use overlay::Frame;
use std::path::{Path, PathBuf};
use std::time::Duration;
use store::{ConfigStore, FileConfigStore, MemoryConfigStore};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(version, about = "Per-NPC kill timer fed by a game client event feed")]
pub struct Cli {
    /// Directory holding config.toml, profile.toml and logs/
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tail the event feed and track kills live (default)
    Run {
        /// Overrides `feed_path` from config.toml
        #[arg(short, long)]
        feed: Option<PathBuf>,
    },
    /// Dispatch a recorded feed start to finish, then print the stats
    Replay {
        path: PathBuf,
        /// Credit replayed kills to the stored stats
        #[arg(long)]
        persist: bool,
    },
    /// Print stored stats
    Stats,
    /// Delete stored stats for an NPC (any casing)
    Reset { name: String },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let home = config::app_home(cli.home.as_deref());

    // -----------------------------------------------------------------------
    // Logging — rolling daily file under <home>/logs. The guard flushes the
    // non-blocking writer on drop, so it lives until run() returns.
    // -----------------------------------------------------------------------
    let _log_guard = init_logging(&home.join("logs"))?;
    install_panic_hook();

    tracing::info!("NPC Kill Timer starting — home {}", home.display());

    let cfg = config::load_or_default(&home)?;

    match cli.command.unwrap_or(Commands::Run { feed: None }) {
        Commands::Run { feed }             => run_live(home, cfg, feed),
        Commands::Replay { path, persist } => replay(&home, cfg, &path, persist),
        Commands::Stats                    => print_stats(&home, cfg),
        Commands::Reset { name }           => reset(&home, cfg, &name),
    }
}

fn init_logging(log_dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log dir {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "npc-timer.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("npc_kill_timer_lib=debug".parse()?),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Logger init failed: {}", e))?;

    Ok(guard)
}

/// Route panics through tracing so they land in the log file.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        tracing::error!("PANIC at {}: {}", location, message);
    }));
}

fn open_profile(home: &Path) -> Result<FileConfigStore> {
    let path = home.join(config::PROFILE_FILE);
    FileConfigStore::open(&path).with_context(|| format!("opening profile {}", path.display()))
}

// ---------------------------------------------------------------------------
// Live pipeline: tailer -> events -> engine -> overlay, plus config watcher
// ---------------------------------------------------------------------------

fn run_live(home: PathBuf, cfg: TimerConfig, feed: Option<PathBuf>) -> Result<()> {
    let feed_path = feed.unwrap_or_else(|| cfg.feed_path.clone());
    if feed_path.as_os_str().is_empty() {
        anyhow::bail!(
            "No event feed configured — set feed_path in {} or pass --feed",
            home.join(config::CONFIG_FILE).display()
        );
    }

    let timer = NpcTimer::new(cfg.clone(), open_profile(&home)?);

    let rt = tokio::runtime::Runtime::new()?;
    let result: Result<()> = rt.block_on(async move {
        let (line_tx,  line_rx)   = mpsc::channel::<String>(2048);
        let (event_tx, event_rx)  = mpsc::channel::<GameEvent>(1024);
        let (config_tx, config_rx) = mpsc::channel::<TimerConfig>(16);
        let (frame_tx, frame_rx)  = mpsc::channel::<Frame>(128);

        tokio::task::spawn_blocking(move || {
            if let Err(e) = tailer::run(feed_path, line_tx) {
                tracing::error!("Tailer stopped: {}", e);
            }
        });
        tokio::task::spawn_blocking(move || {
            if let Err(e) = watcher::run(home, cfg, config_tx) {
                tracing::warn!("Config watcher stopped, changes need a restart: {}", e);
            }
        });
        tokio::spawn(events::run(line_rx, event_tx));
        tokio::spawn(overlay::run(frame_rx));
        let engine = tokio::spawn(engine::run(event_rx, config_rx, frame_tx, timer));

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                Ok(())
            }
            joined = engine => joined?,
        }
    });

    // Blocking watchers never return on their own.
    rt.shutdown_timeout(Duration::from_secs(1));
    result
}

// ---------------------------------------------------------------------------
// Offline commands
// ---------------------------------------------------------------------------

fn replay(home: &Path, cfg: TimerConfig, path: &Path, persist: bool) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading feed {}", path.display()))?;

    let profile = open_profile(home)?;
    if persist {
        replay_into(NpcTimer::new(cfg, profile), &raw);
    } else {
        // Start from the stored stats but keep replayed kills in memory.
        let mut scratch = MemoryConfigStore::new();
        if let Some(blob) = profile.get(stats::CONFIG_GROUP, stats::STATS_KEY) {
            scratch.set(stats::CONFIG_GROUP, stats::STATS_KEY, &blob)?;
        }
        replay_into(NpcTimer::new(cfg, scratch), &raw);
    }
    Ok(())
}

fn replay_into<S: ConfigStore>(mut timer: NpcTimer<S>, raw: &str) {
    let mut events = 0usize;
    let mut kills = 0usize;
    for event in raw.lines().filter_map(events::parse_line) {
        events += 1;
        if let Some(kill) = timer.dispatch(&event) {
            kills += 1;
            println!("kill: {} in {}", kill.name, overlay::format_time(kill.kill_time_ms));
        }
    }
    tracing::info!("Replayed {} events, {} kills", events, kills);
    println!("{} events, {} kills", events, kills);
    write_stats_table(&timer);
}

fn print_stats(home: &Path, cfg: TimerConfig) -> Result<()> {
    let timer = NpcTimer::new(cfg, open_profile(home)?);
    write_stats_table(&timer);
    Ok(())
}

fn reset(home: &Path, cfg: TimerConfig, name: &str) -> Result<()> {
    let mut timer = NpcTimer::new(cfg, open_profile(home)?);
    match timer.reset_stats(name) {
        0 => println!("No stats stored for {}", name.trim()),
        n => println!("Stats for {} have been reset ({} entries)", name.trim(), n),
    }
    Ok(())
}

fn write_stats_table<S: ConfigStore>(timer: &NpcTimer<S>) {
    let fmt = |ms: Option<u64>| ms.map(overlay::format_time).unwrap_or_else(|| "-".to_owned());
    println!("{:<24} {:>6} {:>8} {:>8} {:>10}", "NPC", "Kills", "Average", "Best", "Total");
    for (name, s) in timer.all_stats() {
        println!(
            "{:<24} {:>6} {:>8} {:>8} {:>10}",
            name,
            s.kill_count,
            fmt(s.average_kill_time()),
            fmt(s.personal_best()),
            overlay::format_time(s.total_kill_time),
        );
    }
}
