/// Decodes the client bridge's event feed into typed `GameEvent`s.
///
/// The feed is JSON Lines: one event object per line, tagged by `type`.
///
///   {"type":"interacting_changed","timestamp_ms":0,"source":{"kind":"local_player"},"target":{"kind":"npc","index":812,"name":"Giant Rat"}}
///   {"type":"hitsplat_applied","timestamp_ms":600,"actor":{"kind":"npc","index":812,"name":"Giant Rat"},"health_ratio":0.8}
///   {"type":"npc_despawned","timestamp_ms":3000,"npc":{"index":812,"name":"Giant Rat"},"is_dead":true}
///   {"type":"loot_received","timestamp_ms":3000,"npc":{"index":812,"name":"Giant Rat"}}
///   {"type":"tick","timestamp_ms":3600}
///
/// `timestamp_ms` is the host clock in milliseconds. Only differences are
/// used, so any epoch works.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{Receiver, Sender};

/// An NPC as the game identifies it: `index` is unique among live NPCs,
/// `name` may be missing while the client is still loading its definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcRef {
    pub index: u32,
    #[serde(default)]
    pub name:  Option<String>,
}

impl NpcRef {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    LocalPlayer,
    Player {
        #[serde(default)]
        name: Option<String>,
    },
    Npc(NpcRef),
}

impl Actor {
    pub fn as_npc(&self) -> Option<&NpcRef> {
        match self {
            Self::Npc(npc) => Some(npc),
            _ => None,
        }
    }

    pub fn is_local_player(&self) -> bool {
        matches!(self, Self::LocalPlayer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    NpcSpawned {
        timestamp_ms: u64,
        npc:          NpcRef,
    },
    NpcDespawned {
        timestamp_ms: u64,
        npc:          NpcRef,
        #[serde(default)]
        is_dead:      bool,
    },
    /// A hitsplat landed on `actor`. `health_ratio` is the actor's health
    /// bar as a fraction in 0.0..=1.0, when the client knows it.
    HitsplatApplied {
        timestamp_ms: u64,
        actor:        Actor,
        #[serde(default)]
        health_ratio: Option<f32>,
        #[serde(default)]
        is_dead:      bool,
    },
    InteractingChanged {
        timestamp_ms: u64,
        source:       Actor,
        #[serde(default)]
        target:       Option<Actor>,
    },
    LootReceived {
        timestamp_ms: u64,
        npc:          NpcRef,
    },
    /// One fixed game time-step elapsed.
    Tick {
        timestamp_ms: u64,
    },
    ConfigChanged {
        timestamp_ms: u64,
        group:        String,
    },
}

impl GameEvent {
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            Self::NpcSpawned         { timestamp_ms, .. } => *timestamp_ms,
            Self::NpcDespawned       { timestamp_ms, .. } => *timestamp_ms,
            Self::HitsplatApplied    { timestamp_ms, .. } => *timestamp_ms,
            Self::InteractingChanged { timestamp_ms, .. } => *timestamp_ms,
            Self::LootReceived       { timestamp_ms, .. } => *timestamp_ms,
            Self::Tick               { timestamp_ms }     => *timestamp_ms,
            Self::ConfigChanged      { timestamp_ms, .. } => *timestamp_ms,
        }
    }
}

/// Decode one feed line. Blank lines and `#` comments are skipped, as is
/// anything that does not decode (logged at debug).
pub fn parse_line(raw: &str) -> Option<GameEvent> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!("Skipping feed line ({}): {}", e, line);
            None
        }
    }
}

/// Pipeline task: raw lines in, typed events out.
pub async fn run(mut rx: Receiver<String>, tx: Sender<GameEvent>) -> Result<()> {
    while let Some(line) = rx.recv().await {
        if let Some(event) = parse_line(&line) {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    }
    Ok(())
}
