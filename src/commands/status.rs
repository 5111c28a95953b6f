//! Status command implementation

use super::{install_paths, load_config};
use anyhow::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};
use wendeploy::cache::VersionCache;
use wendeploy::core::repair::{check_json_file, FileStatus};
use wendeploy::installer::UninstallLog;

/// Show the state files of an install directory
pub fn run(dest: Option<PathBuf>, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let paths = install_paths(dest, &config)?;

    println!("{}", "Deployment status".bold());
    println!();
    println!("  Install dir:   {}", paths.install_dir().display());
    println!("  Environment:   {}", config.environment());

    if !paths.is_initialized() {
        println!();
        println!("{}", "Nothing deployed yet".yellow());
        return Ok(());
    }

    let cache_path = paths.cache_json();
    let cache_status = check_json_file::<serde_json::Value>(&cache_path);
    println!("  Version cache: {}", cache_status);

    // Loading a corrupt cache would move it aside
    if matches!(cache_status, FileStatus::Ok) {
        let cache = VersionCache::load(&cache_path)?;
        println!("    {} artifact(s) tracked", cache.len());
        if let Some(updated) = cache.last_updated() {
            println!(
                "    last updated {}",
                updated.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
    }

    let log = UninstallLog::load(paths.uninstall_log(), paths.install_dir())?;
    let files: usize = log.keys().map(|key| log.paths_for(key).len()).sum();
    println!(
        "  Uninstall log: {} file(s) from {} artifact(s)",
        files,
        log.len()
    );

    Ok(())
}
