/// The timer engine — owns all mutable state and dispatches events.
///
/// `NpcTimer` wires the combat tracker, the tracked-name set and the stats
/// store together and exposes the read-only queries the overlay polls.
/// `run` is the pipeline task: it receives events and config reloads over
/// channels and handles them one at a time, so no locking is needed.
///
/// After every event a fresh overlay frame is pushed with `try_send`; after a
/// config change the reset panel is rebuilt the same way. A slow presenter
/// loses frames, it never stalls dispatch.
use crate::{
    config::{TimerConfig, TrackedNpcSet},
    events::GameEvent,
    overlay::{self, Frame},
    stats::{NpcStats, StatsStore, CONFIG_GROUP},
    store::ConfigStore,
    tracker::{CombatTracker, KillRecord},
};
use anyhow::Result;
use tokio::sync::mpsc::{Receiver, Sender};

pub struct NpcTimer<S: ConfigStore> {
    config:  TimerConfig,
    tracked: TrackedNpcSet,
    tracker: CombatTracker,
    stats:   StatsStore<S>,
    /// Latest host timestamp seen; the overlay's notion of "now".
    now_ms:  u64,
}

impl<S: ConfigStore> NpcTimer<S> {
    pub fn new(config: TimerConfig, backend: S) -> Self {
        let tracked = config.tracked_set();
        tracing::info!("Tracking {} NPC names, kill signal {:?}", tracked.len(), config.kill_signal);
        warn_if_untracked(&tracked);
        Self {
            tracker: CombatTracker::new(config.kill_signal),
            stats:   StatsStore::load(backend),
            tracked,
            config,
            now_ms:  0,
        }
    }

    /// Feed one host event through the state machine. Returns the kill it
    /// confirmed, already recorded and persisted.
    pub fn dispatch(&mut self, event: &GameEvent) -> Option<KillRecord> {
        self.now_ms = self.now_ms.max(event.timestamp_ms());

        if let GameEvent::ConfigChanged { group, .. } = event {
            if group == CONFIG_GROUP {
                tracing::debug!("Config group '{}' changed, reloading stats", group);
                self.stats.reload();
            }
        }

        let kill = self.tracker.handle(event, &self.tracked)?;
        let stats = self.stats.record_kill(&kill.name, kill.kill_time_ms);
        tracing::info!(
            "Kill #{} of '{}' in {}ms (best {:?}ms)",
            stats.kill_count,
            kill.name,
            kill.kill_time_ms,
            stats.personal_best()
        );
        Some(kill)
    }

    /// Swap in a new configuration; the tracked set is rebuilt here and only
    /// here.
    pub fn apply_config(&mut self, config: TimerConfig) {
        self.tracked = config.tracked_set();
        self.tracker.set_kill_signal(config.kill_signal);

        let still_tracked = self
            .tracker
            .current_target_name()
            .map_or(true, |name| self.tracked.is_tracked(name));
        if !still_tracked {
            tracing::info!("Current target no longer tracked, dropping session");
            self.tracker.clear();
        }

        tracing::info!("Config applied: tracking {} NPC names", self.tracked.len());
        warn_if_untracked(&self.tracked);
        self.config = config;
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    // -- presentation queries -------------------------------------------------

    pub fn current_tracked_name(&self) -> Option<&str> {
        self.tracker.current_target_name()
    }

    pub fn is_in_combat(&self) -> bool {
        self.tracker.is_in_combat()
    }

    pub fn current_session_elapsed(&self, now_ms: u64) -> u64 {
        self.tracker.session_elapsed_ms(now_ms)
    }

    pub fn stats_for(&self, name: &str) -> Option<NpcStats> {
        self.stats.get(name).copied()
    }

    /// Forget every stats entry for `name`, ignoring case. Returns how many
    /// entries were removed.
    pub fn reset_stats(&mut self, name: &str) -> usize {
        let removed = self.stats.reset(name);
        tracing::info!("Reset stats for '{}' ({} entries removed)", name.trim(), removed);
        removed
    }

    pub fn all_stats(&self) -> impl Iterator<Item = (&String, &NpcStats)> {
        self.stats.iter()
    }
}

fn warn_if_untracked(tracked: &TrackedNpcSet) {
    if tracked.is_empty() {
        tracing::warn!("npcs_to_track is empty; no kills will be timed");
    }
}

// ---------------------------------------------------------------------------
// Engine task
// ---------------------------------------------------------------------------

pub async fn run<S: ConfigStore>(
    mut event_rx:  Receiver<GameEvent>,
    mut config_rx: Receiver<TimerConfig>,
    frame_tx:      Sender<Frame>,
    mut timer:     NpcTimer<S>,
) -> Result<()> {
    let _ = frame_tx.try_send(Frame::Panel(overlay::panel(timer.config())));

    loop {
        tokio::select! {
            // Config reloads are rare — apply immediately, then rebuild the panel
            Some(config) = config_rx.recv() => {
                timer.apply_config(config);
                let _ = frame_tx.try_send(Frame::Panel(overlay::panel(timer.config())));
                let _ = frame_tx.try_send(Frame::Overlay(overlay::render(&timer)));
            }

            // Host events — the hot path. A closed feed ends the engine.
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                timer.dispatch(&event);
                let _ = frame_tx.try_send(Frame::Overlay(overlay::render(&timer)));
            }
        }
    }
    tracing::info!("Event feed closed, engine stopping");
    Ok(())
}
