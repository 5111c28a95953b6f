//! Init command implementation

use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use wendeploy::core::{DeployConfig, DeployPaths};

/// Write a commented default configuration file
pub fn run(force: bool, config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => DeployPaths::user_config_file()?,
    };

    if path.exists() && !force {
        println!(
            "{} Configuration already exists: {}",
            "✓".green(),
            path.display()
        );
        println!("  Use --force to overwrite it");
        return Ok(());
    }

    DeployConfig::generate_default_file(&path)?;
    println!("{} Created {}", "✓".green(), path.display());
    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Set install_dir in the configuration");
    println!("  2. Deploy a package:  wendeploy deploy <manifest>");
    Ok(())
}
