//! Build command implementation

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use wendeploy::builder::{BuildConfig, PackageBuilder};

/// Build a package described by `file` into `out`
pub fn run(file: PathBuf, source: Option<PathBuf>, out: PathBuf) -> Result<()> {
    let config = BuildConfig::load(&file)?;
    let source = source.unwrap_or_else(|| {
        file.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });

    println!(
        "{} {} from {}...",
        "Building".cyan(),
        config.name,
        source.display()
    );

    let builder = PackageBuilder::new(config, &source)?;
    let report = builder
        .build(&out)
        .with_context(|| format!("Failed to build into {}", out.display()))?;

    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} {} standalone file(s)",
        "✓".green(),
        report.standalone
    );
    println!("  {} {} archive(s)", "✓".green(), report.archives);
    if report.excluded > 0 {
        println!("  {} {} excluded", "-".dimmed(), report.excluded);
    }
    println!("  Manifest: {}", report.manifest_path.display());

    Ok(())
}
