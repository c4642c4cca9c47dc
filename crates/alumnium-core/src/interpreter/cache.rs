//! Instruction cache
//!
//! Maps (instruction, scoped tree fingerprint) to the actions that satisfied
//! it, so repeating a goal on an unchanged view skips the model round-trip.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::driver::DriverAction;
use crate::Result;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    entries: HashMap<String, Vec<DriverAction>>,
}

/// In-memory cache with optional JSON persistence
#[derive(Debug, Default)]
pub struct InstructionCache {
    entries: HashMap<String, Vec<DriverAction>>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl InstructionCache {
    /// Cache that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the cache file at `path`; a missing or unreadable file starts empty
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<CacheFile>(&content) {
                Ok(file) => file.entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring corrupt instruction cache");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        debug!(path = %path.display(), entries = entries.len(), "Loaded instruction cache");

        Self {
            entries,
            path: Some(path),
            dirty: false,
        }
    }

    pub fn key(instruction: &str, fingerprint: &str) -> String {
        format!("{}|{}", fingerprint, instruction.trim().to_lowercase())
    }

    pub fn get(&self, key: &str) -> Option<&[DriverAction]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn insert(&mut self, key: String, steps: Vec<DriverAction>) {
        self.entries.insert(key, steps);
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the cache to disk, replacing the file atomically.
    ///
    /// A file already holding every entry is left untouched.
    pub fn save(&mut self) -> Result<Option<PathBuf>> {
        let Some(path) = self.path.clone() else {
            return Ok(None);
        };
        if !self.dirty && path.exists() {
            return Ok(Some(path));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = CacheFile {
            entries: self.entries.clone(),
        };
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&file)?)?;
        std::fs::rename(&tmp, &path)?;

        self.dirty = false;
        debug!(path = %path.display(), entries = self.entries.len(), "Saved instruction cache");
        Ok(Some(path))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_normalises_instruction() {
        assert_eq!(
            InstructionCache::key("  Click Login ", "abc"),
            InstructionCache::key("click login", "abc")
        );
        assert_ne!(
            InstructionCache::key("click login", "abc"),
            InstructionCache::key("click login", "def")
        );
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let mut cache = InstructionCache::load(&path);
        assert!(cache.is_empty());
        cache.insert("k".to_string(), vec![DriverAction::Click { id: 3 }]);
        assert!(cache.is_dirty());

        let saved = cache.save().unwrap();
        assert_eq!(saved.as_deref(), Some(path.as_path()));
        assert!(!cache.is_dirty());

        let reloaded = InstructionCache::load(&path);
        assert_eq!(reloaded.get("k"), Some(&[DriverAction::Click { id: 3 }][..]));
    }

    #[test]
    fn test_clean_cache_is_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = InstructionCache::load(&path);
        cache.insert("k".to_string(), vec![DriverAction::Click { id: 3 }]);
        cache.save().unwrap();

        // another session saved in the meantime
        std::fs::write(&path, r#"{"entries": {}}"#).unwrap();
        assert_eq!(cache.save().unwrap().as_deref(), Some(path.as_path()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"{"entries": {}}"#);

        cache.insert("k2".to_string(), vec![DriverAction::Click { id: 4 }]);
        cache.save().unwrap();
        assert_eq!(InstructionCache::load(&path).len(), 2);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();

        let cache = InstructionCache::load(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let mut cache = InstructionCache::in_memory();
        cache.insert("k".to_string(), vec![]);
        assert!(cache.save().unwrap().is_none());
    }
}
