/// Timer configuration — persisted as TOML in the app's config directory.
///
/// Location, in order of preference:
///   $NPC_TIMER_HOME/config.toml
///   $APPDATA/npc-kill-timer/config.toml
///   <temp dir>/npc-kill-timer/config.toml
///
/// Every field has a serde default so a partial (or empty) file still loads.
use crate::tracker::KillSignal;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE:  &str = "config.toml";
pub const PROFILE_FILE: &str = "profile.toml";

// ---------------------------------------------------------------------------
// TimerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Master switch for the overlay.
    #[serde(default = "default_true")]
    pub npc_timer: bool,

    #[serde(default = "default_true")]
    pub show_current_kill_time: bool,

    #[serde(default = "default_true")]
    pub show_average_kill_time: bool,

    #[serde(default = "default_true")]
    pub show_total_kills: bool,

    #[serde(default = "default_true")]
    pub show_personal_best: bool,

    /// Comma-separated NPC names to track (not case-sensitive).
    #[serde(default)]
    pub npcs_to_track: String,

    /// The one event that credits a kill.
    #[serde(default)]
    pub kill_signal: KillSignal,

    /// JSON Lines event feed written by the client bridge. Empty = not set up.
    #[serde(default)]
    pub feed_path: PathBuf,
}

fn default_true() -> bool { true }

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            npc_timer:              true,
            show_current_kill_time: true,
            show_average_kill_time: true,
            show_total_kills:       true,
            show_personal_best:     true,
            npcs_to_track:          String::new(),
            kill_signal:            KillSignal::default(),
            feed_path:              PathBuf::new(),
        }
    }
}

impl TimerConfig {
    /// Configured names as typed (trimmed, blanks dropped), in order.
    pub fn tracked_names(&self) -> Vec<String> {
        self.npcs_to_track
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn tracked_set(&self) -> TrackedNpcSet {
        TrackedNpcSet::parse(&self.npcs_to_track)
    }
}

// ---------------------------------------------------------------------------
// Tracked NPC set
// ---------------------------------------------------------------------------

/// Lower-cased tracked names, rebuilt whenever the config changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedNpcSet {
    names: HashSet<String>,
}

impl TrackedNpcSet {
    pub fn parse(raw: &str) -> Self {
        let names = raw
            .split(',')
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        Self { names }
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        let name = name.trim();
        !name.is_empty() && self.names.contains(&name.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

// ---------------------------------------------------------------------------
// Directories
// ---------------------------------------------------------------------------

/// Resolve the app home directory (config, profile and logs live here).
pub fn app_home(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Ok(dir) = std::env::var("NPC_TIMER_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    std::env::var("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
        .join("npc-kill-timer")
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

pub fn load_or_default(config_dir: &Path) -> Result<TimerConfig> {
    let path = config_dir.join(CONFIG_FILE);
    if path.exists() {
        let raw = std::fs::read_to_string(&path)?;
        let cfg: TimerConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Config parse error: {}", e))?;
        Ok(cfg)
    } else {
        Ok(TimerConfig::default())
    }
}

pub fn save(config: &TimerConfig, config_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(config_dir)?;
    let raw = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("Config serialize error: {}", e))?;
    std::fs::write(config_dir.join(CONFIG_FILE), raw)?;
    Ok(())
}
