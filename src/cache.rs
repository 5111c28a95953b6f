//! Version cache for deployed artifacts
//!
//! Maps an artifact key (its install-relative path) to the signature that was
//! last deployed for it. During a pass every key still referenced by the
//! manifest is touched; `remove_old_entries` then drops everything untouched,
//! which is how artifacts that left the manifest are detected.

use crate::core::repair::{recover_corrupt, try_parse_json};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Cache file format version
const CACHE_FORMAT: &str = "1.0";

/// On-disk representation
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    version: String,
    last_updated: DateTime<Utc>,
    entries: BTreeMap<String, String>,
}

/// Artifact key → deployed signature, with mark-and-sweep
#[derive(Debug, Clone, Default)]
pub struct VersionCache {
    entries: BTreeMap<String, String>,
    touched: HashSet<String>,
    last_updated: Option<DateTime<Utc>>,
    dirty: bool,
}

impl VersionCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Load cache from file
    ///
    /// A missing file yields an empty cache. A corrupted file is backed up and
    /// also yields an empty cache, so every artifact is treated as stale.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;

        match try_parse_json::<CacheFile>(&content, path) {
            Ok(file) => {
                log::debug!(
                    "Loaded version cache with {} entries from {}",
                    file.entries.len(),
                    path.display()
                );
                Ok(Self {
                    entries: file.entries,
                    touched: HashSet::new(),
                    last_updated: Some(file.last_updated),
                    dirty: false,
                })
            }
            Err(parse_error) => {
                recover_corrupt(path, &parse_error);
                Ok(Self {
                    dirty: true,
                    ..Self::new()
                })
            }
        }
    }

    /// Save cache to file
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let now = Utc::now();
        let file = CacheFile {
            version: CACHE_FORMAT.to_string(),
            last_updated: now,
            entries: self.entries.clone(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        // Write beside the target and rename so a crash never truncates the cache
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, path)?;

        self.last_updated = Some(now);
        self.dirty = false;
        log::debug!("Saved version cache to {}", path.display());
        Ok(())
    }

    /// Signature last deployed for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Record the deployed signature for `key`
    pub fn put(&mut self, key: impl Into<String>, version: impl Into<String>) {
        let key = key.into();
        let version = version.into();
        if self.entries.get(&key) != Some(&version) {
            self.entries.insert(key, version);
            self.dirty = true;
        }
    }

    /// Mark `key` as still referenced in the current pass
    pub fn touch(&mut self, key: impl Into<String>) {
        self.touched.insert(key.into());
    }

    pub fn is_touched(&self, key: &str) -> bool {
        self.touched.contains(key)
    }

    /// Whether `key` is recorded at exactly `version`
    pub fn is_current(&self, key: &str, version: &str) -> bool {
        self.get(key) == Some(version)
    }

    /// Drop every entry not touched since the last sweep
    ///
    /// Returns the purged keys in sorted order and resets the touched set.
    pub fn remove_old_entries(&mut self) -> Vec<String> {
        let stale: Vec<String> = self
            .entries
            .keys()
            .filter(|key| !self.touched.contains(*key))
            .cloned()
            .collect();

        for key in &stale {
            self.entries.remove(key);
        }
        if !stale.is_empty() {
            self.dirty = true;
            log::info!("Removed {} stale cache entr(ies)", stale.len());
        }

        self.touched.clear();
        stale
    }

    /// Whether the cache changed since it was loaded or saved
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recorded keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }
}
