//! Key/value stores backing the render cache.
//!
//! Keys and values are plain strings. [`FileStore`] keeps one JSON file per
//! key, named by the SHA-256 of the key so arbitrary keys are filesystem-safe.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RenderError;

/// Persistent string store.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, RenderError>;
    fn set(&self, key: &str, value: &str) -> Result<(), RenderError>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), RenderError>;
    /// Visit every entry. Unreadable entries are skipped.
    fn iterate(&self, visitor: &mut dyn FnMut(&str, &str)) -> Result<(), RenderError>;
}

/// Get the default on-disk cache directory.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(dirs::config_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("puml-render")
        .join("cache")
}

/// Generate a deterministic filename from a cache key.
pub fn key_to_filename(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let hash = hasher.finalize();
    format!("{:x}.json", hash)
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    value: String,
}

fn cache_err(action: &str, path: &Path, e: impl std::fmt::Display) -> RenderError {
    RenderError::Cache(format!("Failed to {action} {path:?}: {e}"))
}

/// One file per entry under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at [`cache_dir`].
    pub fn open_default() -> Self {
        Self::new(cache_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key_to_filename(key))
    }

    fn read_entry(path: &Path) -> Result<StoredEntry, RenderError> {
        let data = std::fs::read_to_string(path).map_err(|e| cache_err("read", path, e))?;
        serde_json::from_str(&data).map_err(|e| cache_err("parse", path, e))
    }
}

impl CacheStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, RenderError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let entry = Self::read_entry(&path)?;
        // Guards against a (vanishingly unlikely) filename collision.
        Ok((entry.key == key).then_some(entry.value))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), RenderError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| cache_err("create", &self.dir, e))?;
        let path = self.entry_path(key);
        let data = serde_json::to_string(&StoredEntry {
            key: key.to_string(),
            value: value.to_string(),
        })
        .map_err(|e| cache_err("serialize", &path, e))?;

        // Write to a temp file then rename so readers never see a partial entry.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data).map_err(|e| cache_err("write", &tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| cache_err("rename", &path, e))
    }

    fn remove(&self, key: &str) -> Result<(), RenderError> {
        let path = self.entry_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(cache_err("remove", &path, e)),
        }
    }

    fn iterate(&self, visitor: &mut dyn FnMut(&str, &str)) -> Result<(), RenderError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(cache_err("list", &self.dir, e)),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_entry(&path) {
                Ok(stored) => visitor(&stored.key, &stored.value),
                Err(e) => crate::debug_error!("CACHE", "Skipping entry: {}", e),
            }
        }
        Ok(())
    }
}

/// In-process store, for tests and hosts without a writable cache directory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, RenderError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), RenderError> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), RenderError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn iterate(&self, visitor: &mut dyn FnMut(&str, &str)) -> Result<(), RenderError> {
        // Snapshot first so the visitor may call back into the store.
        let snapshot: Vec<(String, String)> = self
            .entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in &snapshot {
            visitor(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_to_filename_deterministic() {
        let a = key_to_filename("png-SoWkIImgAStDuNBAJrBGjLDmpCbCJbMmKiX8pSd9vt98pKi1IW80");
        let b = key_to_filename("png-SoWkIImgAStDuNBAJrBGjLDmpCbCJbMmKiX8pSd9vt98pKi1IW80");
        assert_eq!(a, b);
        assert!(a.ends_with(".json"));
        assert_eq!(a.len(), 64 + ".json".len());
        assert_ne!(a, key_to_filename("svg-SoWkIImgAStDuNBAJrBGjLDmpCbCJbMmKiX8pSd9vt98pKi1IW80"));
    }

    #[test]
    fn test_file_store_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("cache"));

        assert_eq!(store.get("svg-ABC").unwrap(), None);
        store.set("svg-ABC", "<svg/>").unwrap();
        assert_eq!(store.get("svg-ABC").unwrap().as_deref(), Some("<svg/>"));

        store.set("svg-ABC", "<svg>v2</svg>").unwrap();
        assert_eq!(store.get("svg-ABC").unwrap().as_deref(), Some("<svg>v2</svg>"));

        store.remove("svg-ABC").unwrap();
        assert_eq!(store.get("svg-ABC").unwrap(), None);
        store.remove("svg-ABC").unwrap();
    }

    #[test]
    fn test_file_store_iterate_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.set("ts-A", "1").unwrap();
        store.set("ts-B", "2").unwrap();
        std::fs::write(dir.path().join("garbage.json"), "not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut seen = Vec::new();
        store
            .iterate(&mut |k, v| seen.push((k.to_string(), v.to_string())))
            .unwrap();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("ts-A".to_string(), "1".to_string()),
                ("ts-B".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn test_file_store_iterate_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("never-created"));
        let mut count = 0;
        store.iterate(&mut |_, _| count += 1).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.set("ascii-K", "text").unwrap();
        assert!(store.contains("ascii-K"));
        assert_eq!(store.len(), 1);
        store.remove("ascii-K").unwrap();
        assert!(store.is_empty());
    }
}
