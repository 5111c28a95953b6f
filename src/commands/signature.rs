//! Signature command implementation

use anyhow::{Context, Result};
use std::path::PathBuf;
use wendeploy::signature::signature_of_path;

/// Print `<signature>  <path>` for every file
pub fn run(paths: Vec<PathBuf>) -> Result<()> {
    for path in paths {
        let signature = signature_of_path(&path)
            .with_context(|| format!("Failed to sign {}", path.display()))?;
        println!("{}  {}", signature, path.display());
    }
    Ok(())
}
