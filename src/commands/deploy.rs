//! Deploy command implementation

use super::{install_paths, load_config};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use tempfile::TempDir;
use wendeploy::core::{Os, PackageManifest};
use wendeploy::downloader::{provider_for, resolve_location, ProviderOptions, ResourceRequest};
use wendeploy::installer::{ComponentSelection, DeployReport, DeploymentEngine};
use wendeploy::progress::{attach_progress_bar, CancelToken, Segment, WorkerExecutor};
use wendeploy::DeployError;

/// Command line options of `deploy`
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub manifest: String,
    pub dest: Option<PathBuf>,
    pub components: Vec<String>,
    pub without: Vec<String>,
    pub os: Option<Os>,
    pub keep_orphans: bool,
    pub config: Option<PathBuf>,
}

/// Deploy a manifest into an install directory
pub fn run(options: DeployOptions) -> Result<()> {
    let config = load_config(options.config.as_deref())?;
    let paths = install_paths(options.dest.clone(), &config)?;

    let provider_options = ProviderOptions {
        timeout: Some(config.http_timeout()),
        user_agent: config.user_agent.clone(),
    };

    println!("{} {}...", "Loading".cyan(), options.manifest);
    let manifest = fetch_manifest(&options.manifest, &provider_options)?;

    let objects = config.objects_location.clone().unwrap_or_else(|| {
        resolve_location(&options.manifest, manifest.objects_location.as_deref())
    });
    let libraries = config.libraries_location.clone().unwrap_or_else(|| {
        resolve_location(&options.manifest, manifest.libraries_location.as_deref())
    });
    log::debug!("Objects from {}, libraries from {}", objects, libraries);

    let mut environment = config.environment();
    if let Some(os) = options.os {
        environment.os = os;
    }

    let selection = options
        .components
        .iter()
        .fold(ComponentSelection::from_config(&config), |s, id| s.with(id.as_str()));
    let selection = options
        .without
        .iter()
        .fold(selection, |s, id| s.without(id.as_str()));

    println!(
        "{} {} {} into {} ({})",
        "Deploying".cyan(),
        manifest.title.as_deref().unwrap_or(&manifest.name),
        manifest.version,
        paths.install_dir().display(),
        environment
    );

    let engine = DeploymentEngine::new(paths, environment)
        .with_objects(objects.clone(), provider_for(&objects, &provider_options)?)
        .with_libraries(
            libraries.clone(),
            provider_for(&libraries, &provider_options)?,
        )
        .with_selection(selection)
        .clean_orphans(!(options.keep_orphans || config.keep_orphans));

    let executor = WorkerExecutor::new(config.threads)?;
    executor.cancel_on_interrupt();
    let pb = attach_progress_bar(executor.service());
    let task = executor.submit(engine.into_worker(manifest));
    let result = task.wait();
    pb.finish_and_clear();

    if matches!(result, Err(DeployError::Cancelled)) {
        anyhow::bail!("Deployment cancelled; run deploy again to finish it");
    }

    let report = result.context("Deployment failed")?;
    print_report(&report);

    if !report.is_complete() {
        anyhow::bail!(
            "{} artifact(s) could not be deployed; run deploy again to retry",
            report.failures.len()
        );
    }
    Ok(())
}

/// Download or copy the manifest and parse it
fn fetch_manifest(location: &str, options: &ProviderOptions) -> Result<PackageManifest> {
    let provider = provider_for(location, options)?;
    let temp = TempDir::new().context("Failed to create temporary directory")?;
    let staging = temp.path().join("manifest.json");

    provider
        .fetch(
            &ResourceRequest::new("manifest", location),
            &staging,
            &Segment::root(),
            &CancelToken::new(),
        )
        .with_context(|| format!("Failed to fetch manifest from {}", location))?;

    PackageManifest::load(&staging).with_context(|| format!("Invalid manifest: {}", location))
}

fn print_report(report: &DeployReport) {
    println!();
    println!("{}", "Summary:".bold());
    if !report.deployed.is_empty() {
        println!(
            "  {} {} artifact(s) deployed",
            "✓".green(),
            report.deployed.len()
        );
    }
    if !report.kept.is_empty() {
        println!(
            "  {} {} existing file(s) kept",
            "✓".green(),
            report.kept.len()
        );
    }
    if !report.up_to_date.is_empty() {
        println!("  {} {} up to date", "✓".green(), report.up_to_date.len());
    }
    if !report.skipped.is_empty() {
        println!(
            "  {} {} not applicable",
            "-".dimmed(),
            report.skipped.len()
        );
    }
    if !report.removed_keys.is_empty() {
        println!(
            "  {} {} artifact(s) removed ({} file(s) deleted)",
            "✓".green(),
            report.removed_keys.len(),
            report.cleaned.removed
        );
    }
    for failure in &report.failures {
        println!("  {} {}", "✗".red(), failure);
    }
}
