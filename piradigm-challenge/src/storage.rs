//! Named colour ranges kept between runs

use crate::error::{ChallengeError, Result};
use parking_lot::Mutex;
use piradigm_eye::ColourRange;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub trait CalibrationStore: Send {
    /// Stored range for `key`, if any
    fn load(&self, key: &str) -> Result<Option<ColourRange>>;

    fn save(&mut self, key: &str, range: &ColourRange) -> Result<()>;
}

/// In-process store; clones share the same map
#[derive(Clone, Default)]
pub struct MemoryStore {
    ranges: Arc<Mutex<HashMap<String, ColourRange>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(self, key: &str, range: ColourRange) -> Self {
        self.ranges.lock().insert(key.to_string(), range);
        self
    }

    pub fn get(&self, key: &str) -> Option<ColourRange> {
        self.ranges.lock().get(key).copied()
    }
}

impl CalibrationStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<ColourRange>> {
        Ok(self.get(key))
    }

    fn save(&mut self, key: &str, range: &ColourRange) -> Result<()> {
        self.ranges.lock().insert(key.to_string(), *range);
        Ok(())
    }
}

/// JSON object mapping colour names to ranges.
///
/// A missing file reads as empty and is created by the first save. Other
/// colours already in the file are preserved.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, ColourRange>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            ChallengeError::Storage(format!("{}: {}", self.path.display(), e))
        })
    }
}

impl CalibrationStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<ColourRange>> {
        let range = self.read_all()?.remove(key);
        debug!(key, found = range.is_some(), "Loaded colour range");
        Ok(range)
    }

    fn save(&mut self, key: &str, range: &ColourRange) -> Result<()> {
        let mut ranges = self.read_all()?;
        ranges.insert(key.to_string(), *range);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(&ranges)?)?;
        info!(key, path = %self.path.display(), "Saved colour range");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn red() -> ColourRange {
        ColourRange::new([170.0, 80.0, 60.0], [10.0, 255.0, 255.0])
    }

    #[test]
    fn test_memory_store_clones_share() {
        let store = MemoryStore::new();
        let mut writer = store.clone();
        writer.save("red", &red()).unwrap();
        assert_eq!(store.load("red").unwrap(), Some(red()));
        assert_eq!(store.load("blue").unwrap(), None);
    }

    #[test]
    fn test_json_store_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("colours.json"));
        assert_eq!(store.load("red").unwrap(), None);
    }

    #[test]
    fn test_json_store_keeps_other_colours() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("colours.json");
        let mut store = JsonFileStore::new(&path);

        let green = ColourRange::new([50.0, 80.0, 60.0], [70.0, 255.0, 255.0]);
        store.save("red", &red()).unwrap();
        store.save("green", &green).unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.load("red").unwrap(), Some(red()));
        assert_eq!(reopened.load("green").unwrap(), Some(green));
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("colours.json");
        fs::write(&path, "not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load("red"), Err(ChallengeError::Storage(_))));
    }
}
