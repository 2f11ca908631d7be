/// Group/key string store — the stand-in for the game client's config manager.
///
/// Values are opaque strings filed under a config group. The file-backed
/// store keeps every group in one TOML document (`profile.toml`):
///
///   [NpcTimer]
///   npcStats = '{"Giant Rat":{"killCount":3,"totalKillTime":41200,"personalBest":12600}}'
///
/// Every `set` rewrites the whole file (write-through, no batching), and
/// `refresh` re-reads it so edits from another process become visible.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile I/O error at {path:?}: {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("profile parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("profile serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("stats blob error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Host-owned key/value configuration, addressed by (group, key).
pub trait ConfigStore {
    fn get(&self, group: &str, key: &str) -> Option<String>;
    fn set(&mut self, group: &str, key: &str, value: &str) -> Result<(), StoreError>;

    /// Pick up writes made outside this handle. Stores nobody else can
    /// write to have nothing to do.
    fn refresh(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

type Groups = BTreeMap<String, BTreeMap<String, String>>;

fn insert(groups: &mut Groups, group: &str, key: &str, value: &str) {
    groups
        .entry(group.to_owned())
        .or_default()
        .insert(key.to_owned(), value.to_owned());
}

// ---------------------------------------------------------------------------
// In-memory store (replay runs and tests)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct MemoryConfigStore {
    groups: Groups,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, group: &str, key: &str) -> Option<String> {
        self.groups.get(group)?.get(key).cloned()
    }

    fn set(&mut self, group: &str, key: &str, value: &str) -> Result<(), StoreError> {
        insert(&mut self.groups, group, key, value);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FileConfigStore {
    path:   PathBuf,
    groups: Groups,
}

impl FileConfigStore {
    /// Open (or lazily create) the profile at `path`. A missing file is an
    /// empty profile; it is only written on the first mutation.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let groups = read_groups(&path)?;
        tracing::debug!("Profile opened at {:?} ({} groups)", path, groups.len());
        Ok(Self { path, groups })
    }

    fn flush(&self) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io { path: self.path.clone(), source };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let raw = toml::to_string_pretty(&self.groups)?;
        std::fs::write(&self.path, raw).map_err(io_err)
    }
}

impl ConfigStore for FileConfigStore {
    fn get(&self, group: &str, key: &str) -> Option<String> {
        self.groups.get(group)?.get(key).cloned()
    }

    fn set(&mut self, group: &str, key: &str, value: &str) -> Result<(), StoreError> {
        insert(&mut self.groups, group, key, value);
        self.flush()
    }

    /// On error the previously read groups stay in place.
    fn refresh(&mut self) -> Result<(), StoreError> {
        self.groups = read_groups(&self.path)?;
        tracing::debug!("Profile re-read from {:?} ({} groups)", self.path, self.groups.len());
        Ok(())
    }
}

fn read_groups(path: &Path) -> Result<Groups, StoreError> {
    if !path.exists() {
        return Ok(Groups::new());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_store_set_get() {
        let mut store = MemoryConfigStore::new();
        assert!(store.get("NpcTimer", "npcStats").is_none());

        store.set("NpcTimer", "npcStats", "{}").unwrap();
        assert_eq!(store.get("NpcTimer", "npcStats").as_deref(), Some("{}"));
        assert!(store.get("Other", "npcStats").is_none());

        store.set("NpcTimer", "npcStats", r#"{"Cow":{}}"#).unwrap();
        assert_eq!(store.get("NpcTimer", "npcStats").as_deref(), Some(r#"{"Cow":{}}"#));
    }

    #[test]
    fn refresh_sees_writes_from_another_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.toml");

        let mut daemon = FileConfigStore::open(&path).unwrap();
        daemon.set("NpcTimer", "npcStats", "old").unwrap();

        let mut cli = FileConfigStore::open(&path).unwrap();
        cli.set("NpcTimer", "npcStats", "new").unwrap();

        assert_eq!(daemon.get("NpcTimer", "npcStats").as_deref(), Some("old"));
        daemon.refresh().unwrap();
        assert_eq!(daemon.get("NpcTimer", "npcStats").as_deref(), Some("new"));
    }

    #[test]
    fn failed_refresh_keeps_last_good_profile() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.toml");

        let mut store = FileConfigStore::open(&path).unwrap();
        store.set("NpcTimer", "npcStats", "{}").unwrap();
        std::fs::write(&path, "not = [valid").unwrap();

        assert!(matches!(store.refresh(), Err(StoreError::Parse(_))));
        assert_eq!(store.get("NpcTimer", "npcStats").as_deref(), Some("{}"));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("profile.toml");

        let mut store = FileConfigStore::open(&path).unwrap();
        store
            .set("NpcTimer", "npcStats", r#"{"Cow":{"killCount":1}}"#)
            .unwrap();
        store.set("Npc Timer", "note", "spaced group").unwrap();
        assert!(path.exists());

        let reopened = FileConfigStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("NpcTimer", "npcStats").as_deref(),
            Some(r#"{"Cow":{"killCount":1}}"#)
        );
        assert_eq!(reopened.get("Npc Timer", "note").as_deref(), Some("spaced group"));
    }

    #[test]
    fn missing_file_is_empty_profile() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.toml");
        let store = FileConfigStore::open(&path).unwrap();
        assert!(store.get("NpcTimer", "npcStats").is_none());
        assert!(!path.exists(), "open must not create the file");
    }

    #[test]
    fn corrupt_profile_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(FileConfigStore::open(&path), Err(StoreError::Parse(_))));
    }
}
