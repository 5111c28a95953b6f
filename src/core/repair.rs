//! Recovery of corrupted state files
//!
//! The version cache is disposable: when it cannot be parsed it is moved aside
//! into a timestamped backup and the engine starts from an empty cache, which
//! only costs a full redeploy.

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Number of backups kept per state file
const KEEP_BACKUPS: usize = 3;

/// Detailed JSON parse error
#[derive(Debug)]
pub struct JsonParseError {
    pub path: PathBuf,
    pub error: String,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for JsonParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "JSON parse error in {} at line {}, column {}: {}",
            self.path.display(),
            self.line,
            self.column,
            self.error
        )
    }
}

impl std::error::Error for JsonParseError {}

/// Try to parse JSON, returning a detailed error on failure
pub fn try_parse_json<T: DeserializeOwned>(
    content: &str,
    path: &Path,
) -> Result<T, JsonParseError> {
    serde_json::from_str(content).map_err(|e| JsonParseError {
        path: path.to_path_buf(),
        error: e.to_string(),
        line: e.line(),
        column: e.column(),
    })
}

/// Create a timestamped copy of a file
/// Returns the backup path if successful
pub fn create_backup(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        anyhow::bail!("Cannot backup non-existent file: {}", path.display());
    }

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S%3f");
    let file_name = path
        .file_name()
        .context("Invalid file path")?
        .to_string_lossy();
    let backup_name = format!("{}.backup.{}", file_name, timestamp);

    let backup_path = path
        .parent()
        .context("Invalid file path")?
        .join(&backup_name);

    fs::copy(path, &backup_path)
        .with_context(|| format!("Failed to create backup at {}", backup_path.display()))?;

    cleanup_old_backups(path, KEEP_BACKUPS)?;

    Ok(backup_path)
}

/// Clean up old backup files, keeping only the most recent `keep` count
pub fn cleanup_old_backups(original_path: &Path, keep: usize) -> Result<()> {
    let parent = original_path.parent().context("Invalid file path")?;
    let file_name = original_path
        .file_name()
        .context("Invalid file path")?
        .to_string_lossy();

    let pattern = format!("{}.backup.", file_name);

    let mut backups: Vec<_> = fs::read_dir(parent)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(&pattern))
        .collect();

    // Timestamped names sort chronologically
    backups.sort_by_key(|e| e.file_name());

    if backups.len() > keep {
        for entry in backups.iter().take(backups.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }
    }

    Ok(())
}

/// Move a corrupted state file aside so it can be rebuilt
///
/// Returns the backup path when one could be written.
pub fn recover_corrupt(path: &Path, error: &JsonParseError) -> Option<PathBuf> {
    log::warn!("{}; starting from an empty state", error);

    let backup = match create_backup(path) {
        Ok(backup) => {
            log::warn!("Corrupted file backed up to {}", backup.display());
            Some(backup)
        }
        Err(e) => {
            log::warn!("Failed to create backup of corrupted file: {}", e);
            None
        }
    };

    if let Err(e) = fs::remove_file(path) {
        log::warn!("Failed to remove corrupted file {}: {}", path.display(), e);
    }

    backup
}

/// Health of a state file, as reported by the status command
#[derive(Debug, Clone)]
pub enum FileStatus {
    /// File is OK and parseable
    Ok,
    /// File is missing
    Missing,
    /// File exists but is corrupted/unparseable
    Corrupted(String),
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Ok => write!(f, "{}", "OK".green()),
            FileStatus::Missing => write!(f, "{}", "Missing".yellow()),
            FileStatus::Corrupted(err) => write!(f, "{} ({})", "Corrupted".red(), err),
        }
    }
}

/// Check if a JSON file is valid
pub fn check_json_file<T: DeserializeOwned>(path: &Path) -> FileStatus {
    if !path.exists() {
        return FileStatus::Missing;
    }

    match fs::read_to_string(path) {
        Ok(content) => match try_parse_json::<T>(&content, path) {
            Ok(_) => FileStatus::Ok,
            Err(e) => FileStatus::Corrupted(format!("line {}, col {}", e.line, e.column)),
        },
        Err(e) => FileStatus::Corrupted(e.to_string()),
    }
}
