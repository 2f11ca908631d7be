/// Per-NPC kill statistics and their persistence.
///
/// The whole name → stats map is stored as one JSON blob under
/// (`NpcTimer`, `npcStats`) in the host config store. Field names and the
/// "no personal best" sentinel match the client plugin's profiles, which keep
/// loading:
///
///   {"Giant Rat":{"killCount":2,"totalKillTime":4100,"personalBest":2050}}
///
/// Every mutation writes the full blob back. Store failures are logged and
/// swallowed; the in-memory map stays authoritative for this session.
use crate::store::{ConfigStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CONFIG_GROUP: &str = "NpcTimer";
pub const STATS_KEY:    &str = "npcStats";

/// `personalBest` value meaning "no kills yet" (the JVM `Long.MAX_VALUE`).
pub const PERSONAL_BEST_UNSET: u64 = i64::MAX as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcStats {
    pub kill_count:      u32,
    /// Sum of all credited kill times, in milliseconds.
    pub total_kill_time: u64,
    pub personal_best:   u64,
}

impl Default for NpcStats {
    fn default() -> Self {
        Self {
            kill_count:      0,
            total_kill_time: 0,
            personal_best:   PERSONAL_BEST_UNSET,
        }
    }
}

impl NpcStats {
    pub fn record(&mut self, kill_time_ms: u64) {
        self.kill_count += 1;
        self.total_kill_time += kill_time_ms;
        self.personal_best = self.personal_best.min(kill_time_ms);
    }

    /// Mean kill time, `None` before the first kill.
    pub fn average_kill_time(&self) -> Option<u64> {
        (self.kill_count > 0).then(|| self.total_kill_time / u64::from(self.kill_count))
    }

    pub fn personal_best(&self) -> Option<u64> {
        (self.personal_best != PERSONAL_BEST_UNSET).then_some(self.personal_best)
    }
}

/// On-disk shape: every field may be absent or null in old blobs.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredStats {
    kill_count:      Option<u32>,
    total_kill_time: Option<u64>,
    personal_best:   Option<u64>,
}

impl StoredStats {
    /// No kills, or kills with no recorded time, start over from defaults.
    /// An explicit total of 0 stays: a kill can land in the tick it began.
    fn repair(self) -> NpcStats {
        match (self.kill_count, self.total_kill_time) {
            (Some(kill_count), Some(total_kill_time)) if kill_count > 0 => NpcStats {
                kill_count,
                total_kill_time,
                personal_best: self.personal_best.unwrap_or(PERSONAL_BEST_UNSET),
            },
            _ => NpcStats::default(),
        }
    }
}

pub type StatsMap = BTreeMap<String, NpcStats>;

/// Decode a stats blob. Only a blob that is not a JSON object at all is an
/// error; individual broken entries are repaired to defaults.
pub fn decode(json: &str) -> Result<StatsMap, StoreError> {
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .map(|(name, value)| {
            let stored = serde_json::from_value::<StoredStats>(value).unwrap_or_else(|e| {
                tracing::warn!("Stats entry '{}' unreadable ({}), resetting to defaults", name, e);
                StoredStats::default()
            });
            (name, stored.repair())
        })
        .collect())
}

pub fn encode(map: &StatsMap) -> Result<String, StoreError> {
    Ok(serde_json::to_string(map)?)
}

// ---------------------------------------------------------------------------
// StatsStore
// ---------------------------------------------------------------------------

pub struct StatsStore<S: ConfigStore> {
    entries: StatsMap,
    backend: S,
}

impl<S: ConfigStore> StatsStore<S> {
    /// Load the blob from `backend`. Absent, empty, or unparseable blobs give
    /// an empty store.
    pub fn load(backend: S) -> Self {
        let mut store = Self { entries: StatsMap::new(), backend };
        store.read_entries();
        store
    }

    /// Re-read the blob from the backing store, replacing the in-memory map.
    /// Picks up writes from other processes (an offline `reset`, say).
    pub fn reload(&mut self) {
        if let Err(e) = self.backend.refresh() {
            tracing::warn!("Could not re-read stored stats, keeping cached copy: {}", e);
        }
        self.read_entries();
    }

    fn read_entries(&mut self) {
        self.entries = match self.backend.get(CONFIG_GROUP, STATS_KEY) {
            Some(json) if !json.trim().is_empty() => decode(&json).unwrap_or_else(|e| {
                tracing::warn!("Stored stats unreadable, starting empty: {}", e);
                StatsMap::new()
            }),
            _ => StatsMap::new(),
        };
        tracing::debug!("Loaded stats for {} NPCs", self.entries.len());
    }

    /// Write the whole map back, overwriting the previous blob.
    pub fn save(&mut self) -> Result<(), StoreError> {
        let json = encode(&self.entries)?;
        self.backend.set(CONFIG_GROUP, STATS_KEY, &json)
    }

    fn save_logged(&mut self) {
        if let Err(e) = self.save() {
            tracing::warn!("Failed to persist stats: {}", e);
        }
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&NpcStats> {
        self.entries.get(name)
    }

    /// Credit one kill to `name` (as the game spelled it) and persist.
    pub fn record_kill(&mut self, name: &str, kill_time_ms: u64) -> NpcStats {
        let stats = self.entries.entry(name.to_owned()).or_default();
        stats.record(kill_time_ms);
        let updated = *stats;
        self.save_logged();
        updated
    }

    /// Remove every entry whose key matches `name` ignoring case, then
    /// persist. Returns how many entries were removed.
    pub fn reset(&mut self, name: &str) -> usize {
        let wanted = name.trim().to_lowercase();
        let before = self.entries.len();
        self.entries.retain(|key, _| key.to_lowercase() != wanted);
        let removed = before - self.entries.len();
        self.save_logged();
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NpcStats)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileConfigStore, MemoryConfigStore};

    fn backend_with(json: &str) -> MemoryConfigStore {
        let mut backend = MemoryConfigStore::new();
        backend.set(CONFIG_GROUP, STATS_KEY, json).unwrap();
        backend
    }

    #[test]
    fn record_updates_count_total_and_best() {
        let mut store = StatsStore::load(MemoryConfigStore::new());
        store.record_kill("Giant Rat", 3_000);
        store.record_kill("Giant Rat", 2_000);
        let s = store.record_kill("Giant Rat", 4_000);

        assert_eq!(s.kill_count, 3);
        assert_eq!(s.total_kill_time, 9_000);
        assert_eq!(s.personal_best(), Some(2_000));
        assert_eq!(s.average_kill_time(), Some(3_000));
    }

    #[test]
    fn fresh_stats_have_no_best_or_average() {
        let s = NpcStats::default();
        assert_eq!(s.personal_best(), None);
        assert_eq!(s.average_kill_time(), None);
        assert_eq!(s.personal_best, PERSONAL_BEST_UNSET);
    }

    #[test]
    fn every_kill_is_written_through() {
        let mut store = StatsStore::load(MemoryConfigStore::new());
        store.record_kill("Cow", 1_500);

        let blob = store.backend().get(CONFIG_GROUP, STATS_KEY).unwrap();
        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded["Cow"].kill_count, 1);
        assert_eq!(decoded["Cow"].personal_best, 1_500);
    }

    #[test]
    fn missing_fields_are_repaired() {
        let store = StatsStore::load(backend_with(
            r#"{"Cow":{"killCount":2,"totalKillTime":5000},"Goblin":{},"Imp":{"killCount":null}}"#,
        ));

        let cow = store.get("Cow").unwrap();
        assert_eq!(cow.kill_count, 2);
        assert_eq!(cow.total_kill_time, 5_000);
        assert_eq!(cow.personal_best, PERSONAL_BEST_UNSET);

        assert_eq!(*store.get("Goblin").unwrap(), NpcStats::default());
        assert_eq!(*store.get("Imp").unwrap(), NpcStats::default());
    }

    #[test]
    fn kills_without_recorded_time_start_over() {
        let store = StatsStore::load(backend_with(
            r#"{"Cow":{"killCount":2},"Goblin":{"totalKillTime":900},"Imp":{"killCount":1,"totalKillTime":0,"personalBest":0}}"#,
        ));
        for name in ["Cow", "Goblin"] {
            let s = store.get(name).unwrap();
            assert_eq!(*s, NpcStats::default(), "{name}");
            assert_eq!(s.average_kill_time(), None);
        }
        // Same-tick kill: zero time is a real measurement.
        assert_eq!(store.get("Imp").unwrap().average_kill_time(), Some(0));
    }

    #[test]
    fn reload_sees_reset_made_through_another_profile_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.toml");

        let mut live = StatsStore::load(FileConfigStore::open(&path).unwrap());
        live.record_kill("Giant Rat", 1_200);

        let mut offline = StatsStore::load(FileConfigStore::open(&path).unwrap());
        assert_eq!(offline.reset("giant rat"), 1);

        live.reload();
        assert!(live.get("Giant Rat").is_none());

        live.record_kill("Giant Rat", 1_800);
        let on_disk = FileConfigStore::open(&path).unwrap();
        let persisted = decode(&on_disk.get(CONFIG_GROUP, STATS_KEY).unwrap()).unwrap();
        assert_eq!(persisted["Giant Rat"].kill_count, 1);
        assert_eq!(persisted["Giant Rat"].total_kill_time, 1_800);
    }

    #[test]
    fn existing_profile_blob_loads() {
        // Client-written blob: a fresh entry plus one with a real best.
        let store = StatsStore::load(backend_with(
            r#"{"Hill Giant":{"killCount":0,"totalKillTime":0,"personalBest":9223372036854775807},"Cow":{"killCount":1,"totalKillTime":812,"personalBest":812}}"#,
        ));
        assert_eq!(store.get("Hill Giant").unwrap().personal_best(), None);
        assert_eq!(store.get("Cow").unwrap().personal_best(), Some(812));
    }

    #[test]
    fn garbage_blob_starts_empty() {
        assert!(StatsStore::load(backend_with("[1,2,3]")).is_empty());
        assert!(StatsStore::load(backend_with("{oops")).is_empty());
        assert!(StatsStore::load(backend_with("   ")).is_empty());
        assert!(StatsStore::load(MemoryConfigStore::new()).is_empty());
    }

    #[test]
    fn wrong_typed_entry_is_reset_not_dropped() {
        let store = StatsStore::load(backend_with(r#"{"Cow":"seven","Imp":{"killCount":1,"totalKillTime":10,"personalBest":10}}"#));
        assert_eq!(*store.get("Cow").unwrap(), NpcStats::default());
        assert_eq!(store.get("Imp").unwrap().kill_count, 1);
    }

    #[test]
    fn reset_removes_all_case_variants_only() {
        let mut store = StatsStore::load(backend_with(
            r#"{"Cow":{"killCount":1,"totalKillTime":10,"personalBest":10},
                "COW":{"killCount":2,"totalKillTime":30,"personalBest":12},
                "Cow calf":{"killCount":1,"totalKillTime":5,"personalBest":5},
                "Goblin":{"killCount":4,"totalKillTime":40,"personalBest":8}}"#,
        ));

        assert_eq!(store.reset(" cow "), 2);
        assert!(store.get("Cow").is_none());
        assert!(store.get("COW").is_none());
        assert_eq!(store.get("Cow calf").unwrap().kill_count, 1);
        assert_eq!(store.get("Goblin").unwrap().kill_count, 4);

        let persisted = decode(&store.backend().get(CONFIG_GROUP, STATS_KEY).unwrap()).unwrap();
        assert_eq!(persisted.len(), 2);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let mut store = StatsStore::load(MemoryConfigStore::new());
        store.record_kill("Giant Rat", 100);
        assert!(store.get("Giant Rat").is_some());
        assert!(store.get("giant rat").is_none());
    }

    #[test]
    fn three_entries_survive_encode_decode() {
        let mut map = StatsMap::new();
        map.insert("Cow".into(), NpcStats { kill_count: 3, total_kill_time: 9_000, personal_best: 2_500 });
        map.insert("Giant Rat".into(), NpcStats { kill_count: 1, total_kill_time: 2_050, personal_best: 2_050 });
        map.insert("Imp".into(), NpcStats::default());

        let decoded = decode(&encode(&map).unwrap()).unwrap();
        assert_eq!(decoded, map);
    }
}
