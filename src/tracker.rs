/// Combat/kill state machine for the local player.
///
/// Two states: `Idle` and `Engaged(CombatSession)`. Every event is handled
/// synchronously by `CombatTracker::handle`, which returns a `KillRecord`
/// when (and only when) the configured kill signal confirms a kill.
///
/// Exactly one signal credits kills, chosen by `KillSignal`:
///   loot_received   → loot dropped by the engaged (or just-died) NPC
///   despawn_dead    → the engaged NPC despawns with the dead flag
///   health_depleted → a hitsplat leaves the engaged NPC at zero health
///
/// A session without qualifying activity for `COMBAT_TIMEOUT_MS` is dropped
/// without credit, either on the next tick or when the same NPC is engaged
/// again after the window.
///
/// No locking: the engine owns the tracker and feeds it from one task.
use crate::config::TrackedNpcSet;
use crate::events::{Actor, GameEvent, NpcRef};
use serde::{Deserialize, Serialize};

pub const COMBAT_TIMEOUT_MS: u64 = 10_000;
/// How long a dead target waits for its loot event.
pub const LOOT_GRACE_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillSignal {
    #[default]
    LootReceived,
    DespawnDead,
    HealthDepleted,
}

// ---------------------------------------------------------------------------
// Session types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CombatSession {
    /// Game-assigned NPC index; tells same-named NPCs apart.
    pub target:                u32,
    pub name:                  String,
    pub start_ms:              u64,
    pub last_activity_ms:      u64,
    pub observed_health_ratio: Option<f32>,
}

impl CombatSession {
    fn timed_out(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_activity_ms) > COMBAT_TIMEOUT_MS
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CombatState {
    Idle,
    Engaged(CombatSession),
}

/// A target that died before its loot arrived.
#[derive(Debug, Clone, PartialEq)]
struct PendingLoot {
    target:     u32,
    name:       String,
    start_ms:   u64,
    died_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillRecord {
    /// NPC name as the game reported it when combat began.
    pub name:         String,
    pub kill_time_ms: u64,
}

// ---------------------------------------------------------------------------
// CombatTracker
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CombatTracker {
    state:        CombatState,
    pending_loot: Option<PendingLoot>,
    /// NPC index the local player is currently interacting with.
    interacting:  Option<u32>,
    kill_signal:  KillSignal,
}

impl CombatTracker {
    pub fn new(kill_signal: KillSignal) -> Self {
        Self {
            state: CombatState::Idle,
            pending_loot: None,
            interacting: None,
            kill_signal,
        }
    }

    /// Switching signals drops anything half-confirmed under the old one.
    pub fn set_kill_signal(&mut self, kill_signal: KillSignal) {
        if kill_signal != self.kill_signal {
            tracing::info!("Kill signal changed: {:?} -> {:?}", self.kill_signal, kill_signal);
            self.kill_signal = kill_signal;
            self.pending_loot = None;
        }
    }

    pub fn state(&self) -> &CombatState {
        &self.state
    }

    pub fn session(&self) -> Option<&CombatSession> {
        match &self.state {
            CombatState::Engaged(session) => Some(session),
            CombatState::Idle => None,
        }
    }

    pub fn is_in_combat(&self) -> bool {
        self.session().is_some()
    }

    pub fn current_target_name(&self) -> Option<&str> {
        self.session().map(|s| s.name.as_str())
    }

    /// Milliseconds since the session began. 0 when idle.
    pub fn session_elapsed_ms(&self, now_ms: u64) -> u64 {
        self.session()
            .map(|s| now_ms.saturating_sub(s.start_ms))
            .unwrap_or(0)
    }

    /// Drop the session and any pending loot without credit.
    pub fn clear(&mut self) {
        self.state = CombatState::Idle;
        self.pending_loot = None;
    }

    pub fn handle(&mut self, event: &GameEvent, tracked: &TrackedNpcSet) -> Option<KillRecord> {
        let now_ms = event.timestamp_ms();
        match event {
            GameEvent::InteractingChanged { source, target, .. } => {
                if source.is_local_player() {
                    self.interaction_changed(target.as_ref(), tracked, now_ms);
                }
                None
            }

            GameEvent::HitsplatApplied { actor, health_ratio, is_dead, .. } => {
                let npc = actor.as_npc()?;
                self.hitsplat(npc, *health_ratio, *is_dead, tracked, now_ms)
            }

            GameEvent::NpcDespawned { npc, is_dead, .. } => self.despawned(npc, *is_dead, now_ms),

            GameEvent::LootReceived { npc, .. } => self.loot_received(npc, tracked, now_ms),

            GameEvent::Tick { .. } => {
                self.tick(now_ms);
                None
            }

            GameEvent::NpcSpawned { npc, .. } => {
                tracing::trace!("NPC spawned: #{} {:?}", npc.index, npc.name());
                None
            }

            GameEvent::ConfigChanged { .. } => None,
        }
    }

    // -- transitions --------------------------------------------------------

    fn interaction_changed(&mut self, target: Option<&Actor>, tracked: &TrackedNpcSet, now_ms: u64) {
        let Some(npc) = target.and_then(Actor::as_npc) else {
            if self.interacting.take().is_some() && self.is_in_combat() {
                tracing::debug!("Local player disengaged at {}ms", now_ms);
            }
            return;
        };

        self.interacting = Some(npc.index);
        if let Some(name) = npc.name().filter(|n| tracked.is_tracked(n)) {
            self.engage(npc.index, name, None, now_ms);
        }
    }

    fn hitsplat(
        &mut self,
        npc:          &NpcRef,
        health_ratio: Option<f32>,
        is_dead:      bool,
        tracked:      &TrackedNpcSet,
        now_ms:       u64,
    ) -> Option<KillRecord> {
        let on_session = self.session().is_some_and(|s| s.target == npc.index);
        if !on_session && self.interacting != Some(npc.index) {
            return None;
        }
        let name = npc.name().filter(|n| tracked.is_tracked(n))?;

        self.engage(npc.index, name, health_ratio, now_ms);
        let depleted = self.observe_health(health_ratio, is_dead);

        if depleted && self.kill_signal == KillSignal::HealthDepleted {
            return self.confirm_session(now_ms);
        }
        None
    }

    fn despawned(&mut self, npc: &NpcRef, is_dead: bool, now_ms: u64) -> Option<KillRecord> {
        if self.interacting == Some(npc.index) {
            self.interacting = None;
        }
        if !self.session().is_some_and(|s| s.target == npc.index) {
            return None;
        }

        if !is_dead {
            self.abandon("target despawned alive");
            return None;
        }

        match self.kill_signal {
            KillSignal::DespawnDead | KillSignal::HealthDepleted => self.confirm_session(now_ms),
            KillSignal::LootReceived => {
                if let CombatState::Engaged(session) =
                    std::mem::replace(&mut self.state, CombatState::Idle)
                {
                    tracing::debug!("'{}' died at {}ms, waiting for loot", session.name, now_ms);
                    self.pending_loot = Some(PendingLoot {
                        target:     session.target,
                        name:       session.name,
                        start_ms:   session.start_ms,
                        died_at_ms: now_ms,
                    });
                }
                None
            }
        }
    }

    fn loot_received(&mut self, npc: &NpcRef, tracked: &TrackedNpcSet, now_ms: u64) -> Option<KillRecord> {
        if self.kill_signal != KillSignal::LootReceived {
            return None;
        }
        npc.name().filter(|n| tracked.is_tracked(n))?;

        // Loot comes from a corpse, so a dead target waiting on its drop
        // outranks a live session on a same-named NPC.
        let for_pending = self
            .pending_loot
            .as_ref()
            .is_some_and(|p| p.target == npc.index && !loot_expired(p, now_ms));
        if for_pending {
            let pending = self.pending_loot.take()?;
            return Some(self.credit(pending.name, pending.start_ms, now_ms));
        }

        if self.session().is_some_and(|s| s.target == npc.index) {
            return self.confirm_session(now_ms);
        }
        None
    }

    fn tick(&mut self, now_ms: u64) {
        if self.pending_loot.as_ref().is_some_and(|p| loot_expired(p, now_ms)) {
            if let Some(p) = self.pending_loot.take() {
                tracing::debug!("No loot for '{}' within {}ms, not credited", p.name, LOOT_GRACE_MS);
            }
        }

        let interacting = self.interacting;
        let CombatState::Engaged(session) = &mut self.state else {
            return;
        };
        if interacting == Some(session.target) {
            session.last_activity_ms = now_ms;
        } else if session.timed_out(now_ms) {
            self.abandon("combat timed out");
        }
    }

    // -- helpers ------------------------------------------------------------

    /// Start or continue a session on `index`.
    fn engage(&mut self, index: u32, name: &str, health_ratio: Option<f32>, now_ms: u64) {
        if let CombatState::Engaged(session) = &mut self.state {
            if session.target == index && !session.timed_out(now_ms) {
                session.last_activity_ms = now_ms;
                return;
            }
        }

        let fresh = CombatSession {
            target:                index,
            name:                  name.to_owned(),
            start_ms:              now_ms,
            last_activity_ms:      now_ms,
            observed_health_ratio: health_ratio,
        };
        if let CombatState::Engaged(prev) = std::mem::replace(&mut self.state, CombatState::Engaged(fresh)) {
            tracing::debug!("Dropping session on '{}' (#{}) without credit", prev.name, prev.target);
        }
        tracing::info!("Engaged '{}' (#{}) at {}ms", name, index, now_ms);
    }

    /// Record a health reading; true when the target is at zero / dead.
    fn observe_health(&mut self, health_ratio: Option<f32>, is_dead: bool) -> bool {
        let CombatState::Engaged(session) = &mut self.state else {
            return false;
        };
        if is_dead {
            return true;
        }
        let Some(ratio) = health_ratio else {
            return false;
        };
        if ratio <= 0.0 {
            return true;
        }
        if session.observed_health_ratio.map_or(true, |seen| ratio < seen) {
            session.observed_health_ratio = Some(ratio);
        }
        false
    }

    fn confirm_session(&mut self, now_ms: u64) -> Option<KillRecord> {
        match std::mem::replace(&mut self.state, CombatState::Idle) {
            CombatState::Engaged(session) => Some(self.credit(session.name, session.start_ms, now_ms)),
            CombatState::Idle => None,
        }
    }

    fn credit(&mut self, name: String, start_ms: u64, now_ms: u64) -> KillRecord {
        let kill_time_ms = now_ms.saturating_sub(start_ms);
        tracing::debug!("Kill confirmed via {:?}: '{}' in {}ms", self.kill_signal, name, kill_time_ms);
        KillRecord { name, kill_time_ms }
    }

    fn abandon(&mut self, reason: &str) {
        if let CombatState::Engaged(session) = std::mem::replace(&mut self.state, CombatState::Idle) {
            tracing::info!("Session on '{}' ended without a kill: {}", session.name, reason);
        }
    }
}

fn loot_expired(pending: &PendingLoot, now_ms: u64) -> bool {
    now_ms.saturating_sub(pending.died_at_ms) > LOOT_GRACE_MS
}
