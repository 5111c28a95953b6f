//! Append-only record of the files each artifact wrote
//!
//! Every record is one JSON line `{"key": ..., "path": ...}` with the path
//! relative to the install directory. A record is flushed and synced before
//! the file it names is written, so after a crash the log never misses a file
//! that exists on disk. A torn last line is ignored on load and terminated
//! before the next append.

use super::extractor::absolute;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogRecord {
    key: String,
    path: String,
}

/// Artifact key → paths written for it
#[derive(Debug)]
pub struct UninstallLog {
    log_path: PathBuf,
    install_dir: PathBuf,
    entries: BTreeMap<String, BTreeSet<String>>,
    writer: Option<File>,
    /// The file on disk does not end with a newline
    torn_tail: bool,
}

impl UninstallLog {
    /// Load the log at `log_path`; a missing file yields an empty log
    pub fn load(log_path: impl Into<PathBuf>, install_dir: impl Into<PathBuf>) -> Result<Self> {
        let log_path = log_path.into();
        let mut entries: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut torn_tail = false;

        if log_path.exists() {
            let content = fs::read(&log_path)?;
            torn_tail = content.last().is_some_and(|b| *b != b'\n');

            let content = String::from_utf8_lossy(&content);
            for (index, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogRecord>(line) {
                    Ok(record) => {
                        entries.entry(record.key).or_default().insert(record.path);
                    }
                    Err(e) => {
                        log::warn!(
                            "Ignoring unreadable uninstall log line {} in {}: {}",
                            index + 1,
                            log_path.display(),
                            e
                        );
                    }
                }
            }
        }

        let install_dir = install_dir.into();
        Ok(Self {
            log_path,
            install_dir: absolute(&install_dir).unwrap_or(install_dir),
            entries,
            writer: None,
            torn_tail,
        })
    }

    /// Record that `key` writes `path`
    ///
    /// Returns once the record is durable. Recording an existing pair is a
    /// no-op.
    pub fn record(&mut self, key: &str, path: &Path) -> Result<()> {
        let relative = self.relative(path);
        if self
            .entries
            .get(key)
            .is_some_and(|paths| paths.contains(&relative))
        {
            return Ok(());
        }

        let record = LogRecord {
            key: key.to_string(),
            path: relative.clone(),
        };
        let mut line = String::new();
        if self.torn_tail {
            line.push('\n');
        }
        line.push_str(
            &serde_json::to_string(&record)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
        );
        line.push('\n');

        let writer = self.writer()?;
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        writer.sync_data()?;
        self.torn_tail = false;

        self.entries.entry(key.to_string()).or_default().insert(relative);
        Ok(())
    }

    /// Install-relative paths recorded for `key`
    pub fn paths_for(&self, key: &str) -> Vec<&str> {
        self.entries
            .get(key)
            .map(|paths| paths.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Absolute location of a recorded path
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.install_dir.join(relative)
    }

    /// Whether any key other than those in `ignoring` claims `relative`
    pub fn is_claimed(&self, relative: &str, ignoring: &BTreeSet<&str>) -> bool {
        self.entries
            .iter()
            .any(|(key, paths)| !ignoring.contains(key.as_str()) && paths.contains(relative))
    }

    /// Forget `key` in memory; persisted by `compact`
    pub fn remove_key(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite the log from memory, replacing the file atomically
    pub fn compact(&mut self) -> Result<()> {
        self.writer = None;

        let dir = self
            .log_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        for (key, paths) in &self.entries {
            for path in paths {
                let record = LogRecord {
                    key: key.clone(),
                    path: path.clone(),
                };
                let line = serde_json::to_string(&record)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                writeln!(temp, "{}", line)?;
            }
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.log_path).map_err(|e| e.error)?;
        self.torn_tail = false;

        log::debug!(
            "Compacted uninstall log {} ({} key(s))",
            self.log_path.display(),
            self.entries.len()
        );
        Ok(())
    }

    fn writer(&mut self) -> Result<&mut File> {
        let file = match self.writer.take() {
            Some(file) => file,
            None => {
                if let Some(parent) = self.log_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.log_path)?
            }
        };
        Ok(self.writer.insert(file))
    }

    fn relative(&self, path: &Path) -> String {
        let path = absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let relative = path.strip_prefix(&self.install_dir).unwrap_or(&path);
        relative.to_string_lossy().replace('\\', "/")
    }
}
