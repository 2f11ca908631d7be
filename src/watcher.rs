/// Watches `config.toml` and forwards each successfully parsed revision to
/// the engine.
///
/// Editors often save in several steps (truncate, write, rename), so the
/// same content may be seen more than once; unchanged configs are not
/// re-sent. A file that fails to parse is logged and ignored, and the engine
/// keeps the last good config.
use crate::config::{self, TimerConfig};
use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use tokio::sync::mpsc::Sender;

/// Re-read the config in `config_dir`; `None` if it is missing or invalid.
fn reload(config_dir: &Path) -> Option<TimerConfig> {
    if !config_dir.join(config::CONFIG_FILE).exists() {
        return None;
    }
    match config::load_or_default(config_dir) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            tracing::warn!("Ignoring config change: {}", e);
            None
        }
    }
}

/// Blocking watch loop. Spawn with `tokio::task::spawn_blocking`.
pub fn run(config_dir: PathBuf, current: TimerConfig, tx: Sender<TimerConfig>) -> Result<()> {
    let config_path = config_dir.join(config::CONFIG_FILE);
    tracing::info!("Config watcher starting: {:?}", config_path);

    std::fs::create_dir_all(&config_dir)?;
    let (fs_tx, fs_rx) = std_mpsc::channel::<notify::Result<Event>>();
    let mut watcher = RecommendedWatcher::new(fs_tx, notify::Config::default())?;
    watcher.watch(&config_dir, RecursiveMode::NonRecursive)?;

    let mut last = current;
    loop {
        match fs_rx.recv() {
            Ok(Ok(Event { kind: EventKind::Modify(_) | EventKind::Create(_), paths, .. })) => {
                if !paths.iter().any(|p| p.ends_with(config::CONFIG_FILE)) {
                    continue;
                }
                let Some(cfg) = reload(&config_dir) else { continue };
                if cfg == last {
                    continue;
                }
                tracing::info!("Config reloaded: tracking '{}'", cfg.npcs_to_track);
                last = cfg.clone();
                if tx.blocking_send(cfg).is_err() {
                    break;
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!("Config watcher error: {}", e),
            Err(_) => break,
        }
    }
    Ok(())
}
