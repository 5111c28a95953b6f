//! Clean command implementation

use super::{install_paths, load_config};
use anyhow::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};
use wendeploy::installer::uninstall_all;
use wendeploy::utils::confirm;

/// Remove every recorded file of an install directory
pub fn run(dest: Option<PathBuf>, yes: bool, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let paths = install_paths(dest, &config)?;

    if !paths.is_initialized() {
        println!(
            "{} Nothing deployed in {}",
            "✗".yellow(),
            paths.install_dir().display()
        );
        return Ok(());
    }

    if !yes {
        let question = format!(
            "Remove all deployed files from {}?",
            paths.install_dir().display()
        );
        if !confirm(&question, false)? {
            println!("Clean cancelled");
            return Ok(());
        }
    }

    let summary = uninstall_all(&paths)?;
    println!(
        "{} Removed {} file(s) from {}",
        "✓".green(),
        summary.removed,
        paths.install_dir().display()
    );
    if summary.missing > 0 {
        println!("  {} file(s) were already gone", summary.missing);
    }
    Ok(())
}
