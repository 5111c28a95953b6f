//! Removal of files left behind by artifacts that left the manifest

use super::uninstall_log::UninstallLog;
use crate::core::paths::DeployPaths;
use crate::error::{DeployError, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Counts of one cleaning run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanSummary {
    /// Files deleted
    pub removed: usize,
    /// Recorded files that were already gone
    pub missing: usize,
    /// Files kept because a surviving artifact also wrote them
    pub shared: usize,
}

/// Delete the files recorded for `keys` and forget those keys
///
/// A path is kept when an artifact outside `keys` also recorded it.
/// Directories emptied by the removal are pruned up to the install directory.
pub fn remove_orphans(log: &mut UninstallLog, keys: &[String]) -> Result<CleanSummary> {
    let mut summary = CleanSummary::default();
    if keys.is_empty() {
        return Ok(summary);
    }

    let purged: BTreeSet<&str> = keys.iter().map(String::as_str).collect();
    let mut doomed = Vec::new();
    for key in keys {
        for relative in log.paths_for(key) {
            if log.is_claimed(relative, &purged) {
                log::debug!("Keeping {} (still used by another artifact)", relative);
                summary.shared += 1;
            } else {
                doomed.push((key.as_str(), log.resolve(relative)));
            }
        }
    }

    for (key, path) in &doomed {
        match fs::remove_file(path) {
            Ok(()) => {
                log::info!("Removed {}", path.display());
                summary.removed += 1;
                prune_empty_dirs(path, log.install_dir());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => summary.missing += 1,
            Err(e) => return Err(DeployError::deployment(*key, path, e)),
        }
    }

    for key in keys {
        log.remove_key(key);
    }
    log.compact()?;

    Ok(summary)
}

/// Remove every file the uninstall log records, then the state directory
pub fn uninstall_all(paths: &DeployPaths) -> Result<CleanSummary> {
    let mut log = UninstallLog::load(paths.uninstall_log(), paths.install_dir())?;
    let keys: Vec<String> = log.keys().map(str::to_string).collect();
    let summary = remove_orphans(&mut log, &keys)?;
    drop(log);

    let state_dir = paths.state_dir();
    if state_dir.exists() {
        fs::remove_dir_all(&state_dir)?;
    }
    Ok(summary)
}

/// Remove empty ancestors of `path` below `root`
fn prune_empty_dirs(path: &Path, root: &Path) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        if fs::remove_dir(dir).is_err() {
            break;
        }
        log::debug!("Removed empty directory {}", dir.display());
        current = dir.parent();
    }
}
