//! Deployment engine
//!
//! Reconciles an install directory with a package manifest:
//! - plans which files and libraries apply to this environment and selection
//! - skips artifacts whose cached signature is current
//! - fetches stale artifacts through a resource provider and deploys them
//! - sweeps cache entries of artifacts that left the manifest
//!
//! A pass runs on one `WorkContext`: progress lands in its segment and its
//! cancel token is checked between entries.

use super::cleaner::{remove_orphans, CleanSummary};
use super::deploy::{remove_staging, DeployContext, DeployOutcome};
use super::filters::{FilterProvider, StandardFilters};
use super::uninstall_log::UninstallLog;
use crate::cache::VersionCache;
use crate::core::config::DeployConfig;
use crate::core::manifest::{PackageFile, PackageManifest, SingleFile, VerifyMethod};
use crate::core::paths::DeployPaths;
use crate::core::platform::Environment;
use crate::core::library::check_segment;
use crate::core::Library;
use crate::downloader::{join_location, ResourceProvider, ResourceRequest};
use crate::error::{DeployError, Result};
use crate::progress::{CancelToken, Segment, WorkContext, Worker};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

/// Share of a pass spent planning
const PLAN_SHARE: f64 = 0.05;
/// Share of a pass spent fetching and deploying
const FILES_SHARE: f64 = 0.90;
/// Share of a pass spent sweeping and saving
const FINISH_SHARE: f64 = 0.05;

/// Caller overrides of the manifest's component defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentSelection {
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
}

impl ComponentSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        let mut selection = Self::new();
        for id in &config.select {
            selection = selection.with(id);
        }
        for id in &config.deselect {
            selection = selection.without(id);
        }
        selection
    }

    /// Select `id` even if the manifest does not by default
    pub fn with(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.exclude.remove(&id);
        self.include.insert(id);
        self
    }

    /// Deselect `id`; required components stay selected
    pub fn without(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.include.remove(&id);
        self.exclude.insert(id);
        self
    }

    /// Whether component `id` of `manifest` is installed
    pub fn is_selected(&self, manifest: &PackageManifest, id: &str) -> bool {
        let Some(component) = manifest.component(id) else {
            return false;
        };
        if component.required {
            return true;
        }
        if self.exclude.contains(id) {
            return false;
        }
        self.include.contains(id) || component.selected
    }
}

/// Outcome of one deployment pass
#[derive(Debug, Default)]
pub struct DeployReport {
    /// Keys fetched and written
    pub deployed: Vec<String>,
    /// Keys fetched but whose existing destination was kept
    pub kept: Vec<String>,
    /// Keys whose cached signature was current
    pub up_to_date: Vec<String>,
    /// Keys (or library names) not applicable to this environment or selection
    pub skipped: Vec<String>,
    /// Per-artifact fetch and integrity failures
    pub failures: Vec<DeployError>,
    /// Cache keys purged because they left the manifest
    pub removed_keys: Vec<String>,
    /// Files deleted for the purged keys
    pub cleaned: CleanSummary,
}

impl DeployReport {
    /// Whether every applicable artifact is in place
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Where an artifact is fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Objects,
    Libraries,
}

/// One artifact the pass will look at
#[derive(Debug, Clone)]
struct PlannedEntry {
    key: String,
    location: String,
    origin: Origin,
    file: PackageFile,
    verify: Option<VerifyMethod>,
}

impl PlannedEntry {
    fn final_path(&self) -> Result<PathBuf> {
        let dest_dir = self.file.dest_dir().ok_or_else(|| {
            DeployError::config(format!("File '{}' has no destination directory", self.key))
        })?;
        Ok(dest_dir.join(self.file.final_filename()?))
    }

    /// `<final name>.tmp` next to the destination
    fn staging_path(&self) -> Result<PathBuf> {
        let final_path = self.final_path()?;
        let mut name = final_path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        Ok(final_path.with_file_name(name))
    }
}

#[derive(Debug, Default)]
struct Plan {
    entries: Vec<PlannedEntry>,
    skipped: Vec<String>,
}

struct Source {
    location: String,
    provider: Box<dyn ResourceProvider>,
}

/// Reconciles an install directory with a manifest
pub struct DeploymentEngine {
    paths: DeployPaths,
    environment: Environment,
    selection: ComponentSelection,
    objects: Option<Source>,
    libraries: Option<Source>,
    filters: Box<dyn FilterProvider>,
    clean_orphans: bool,
}

impl DeploymentEngine {
    pub fn new(paths: DeployPaths, environment: Environment) -> Self {
        Self {
            paths,
            environment,
            selection: ComponentSelection::new(),
            objects: None,
            libraries: None,
            filters: Box::new(StandardFilters),
            clean_orphans: true,
        }
    }

    /// Fetch file group objects from `location` through `provider`
    pub fn with_objects(
        mut self,
        location: impl Into<String>,
        provider: Box<dyn ResourceProvider>,
    ) -> Self {
        self.objects = Some(Source {
            location: location.into(),
            provider,
        });
        self
    }

    /// Fetch libraries from `location` through `provider`
    pub fn with_libraries(
        mut self,
        location: impl Into<String>,
        provider: Box<dyn ResourceProvider>,
    ) -> Self {
        self.libraries = Some(Source {
            location: location.into(),
            provider,
        });
        self
    }

    pub fn with_selection(mut self, selection: ComponentSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_filters(mut self, filters: Box<dyn FilterProvider>) -> Self {
        self.filters = filters;
        self
    }

    /// Delete files of artifacts that left the manifest (default: on)
    pub fn clean_orphans(mut self, clean: bool) -> Self {
        self.clean_orphans = clean;
        self
    }

    pub fn paths(&self) -> &DeployPaths {
        &self.paths
    }

    /// Wrap a pass over `manifest` as a schedulable worker
    pub fn into_worker(self, manifest: PackageManifest) -> Worker<DeployReport> {
        let title = manifest
            .title
            .clone()
            .unwrap_or_else(|| manifest.name.clone());
        Worker::new(format!("Deploying {}", title), move |ctx| {
            self.run(&manifest, ctx)
        })
    }

    /// Run one deployment pass
    pub fn run(&self, manifest: &PackageManifest, ctx: &WorkContext) -> Result<DeployReport> {
        manifest.validate()?;

        let root = ctx.segment();
        let plan_segment = root.split(PLAN_SHARE);
        let files_segment = root.split(FILES_SHARE);
        let finish_segment = root.split(FINISH_SHARE);

        plan_segment.set_status("Planning");
        log::info!(
            "Deploying {} {} into {}",
            manifest.name,
            manifest.version,
            self.paths.install_dir().display()
        );

        fs::create_dir_all(self.paths.state_dir())?;
        let plan = self.plan(manifest)?;
        let mut cache = VersionCache::load(&self.paths.cache_json())?;
        let mut log = UninstallLog::load(self.paths.uninstall_log(), self.paths.install_dir())?;
        plan_segment.finish(format!("{} artifact(s) to check", plan.entries.len()));

        let mut report = DeployReport {
            skipped: plan.skipped,
            ..DeployReport::default()
        };

        if let Err(e) = self.deploy_entries(
            &plan.entries,
            &files_segment,
            ctx.cancel_token(),
            &mut cache,
            &mut log,
            &mut report,
        ) {
            // Keep what was recorded so far; the sweep only runs on a full pass
            if cache.is_dirty() {
                if let Err(save_error) = cache.save(&self.paths.cache_json()) {
                    log::warn!("Failed to save version cache: {}", save_error);
                }
            }
            return Err(e);
        }
        files_segment.finish("Files deployed");

        finish_segment.set_status("Cleaning up");
        report.removed_keys = cache.remove_old_entries();
        if self.clean_orphans && !report.removed_keys.is_empty() {
            report.cleaned = remove_orphans(&mut log, &report.removed_keys)?;
        }
        if cache.is_dirty() {
            cache.save(&self.paths.cache_json())?;
        }
        finish_segment.finish("Done");

        log::info!(
            "Deployed {}, up to date {}, skipped {}, failed {}, removed {}",
            report.deployed.len() + report.kept.len(),
            report.up_to_date.len(),
            report.skipped.len(),
            report.failures.len(),
            report.removed_keys.len()
        );
        Ok(report)
    }

    /// Resolve the applicable artifacts of `manifest`
    fn plan(&self, manifest: &PackageManifest) -> Result<Plan> {
        let mut plan = Plan::default();

        for group in &manifest.groups {
            let dest_dir = self.paths.install_dir().join(&group.dest);

            for file in &group.files {
                let key = group.dest_path(file)?;

                if let Some(platform) = file.platform() {
                    if platform != self.environment.os {
                        log::debug!("Skipping {} (platform {})", key, platform);
                        plan.skipped.push(key);
                        continue;
                    }
                }

                if let Some(component) = group.component_of(file) {
                    if !self.selection.is_selected(manifest, component) {
                        log::debug!("Skipping {} (component {} not selected)", key, component);
                        plan.skipped.push(key);
                        continue;
                    }
                }

                let base = self.source(Origin::Objects)?;
                let mut file = file.clone();
                file.set_dest_dir(&dest_dir);
                plan.entries.push(PlannedEntry {
                    key,
                    location: join_location(&base.location, &group.source_path(&file)),
                    origin: Origin::Objects,
                    file,
                    verify: group.verify,
                });
            }
        }

        for library in &manifest.libraries {
            if !library.matches(&self.environment) {
                log::debug!("Skipping library {} (rules)", library.name);
                plan.skipped.push(library.name.clone());
                continue;
            }
            self.plan_library(library, &mut plan)?;
        }

        Ok(plan)
    }

    /// A library resolves to its jar plus, when it has one for this OS, a
    /// natives archive
    fn plan_library(&self, library: &Library, plan: &mut Plan) -> Result<()> {
        let base = self.source(Origin::Libraries)?;
        let coordinate = library.coordinate()?;

        let jar_path = coordinate.path(None);
        let mut jar = PackageFile::File(SingleFile {
            name: jar_path.clone(),
            filters: Vec::new(),
            size: library.size,
            platform: None,
            version: library
                .signature
                .clone()
                .unwrap_or_else(|| coordinate.to_string()),
            component: None,
            overwrite: None,
            dest_dir: None,
        });
        jar.set_dest_dir(self.paths.install_dir().join("libraries"));
        plan.entries.push(PlannedEntry {
            key: jar_path.clone(),
            location: join_location(&base.location, &jar_path),
            origin: Origin::Libraries,
            file: jar,
            verify: library.signature.as_ref().map(|_| VerifyMethod::Signature),
        });

        if let Some(classifier) = library.native_classifier(&self.environment) {
            check_segment(&library.name, &classifier)?;
            let natives_path = coordinate.path(Some(&classifier));
            let file_name = natives_path
                .rsplit('/')
                .next()
                .unwrap_or(&natives_path)
                .to_string();

            let mut natives = PackageFile::archive(
                file_name,
                format!(
                    "{}:{}:{}:{}",
                    coordinate.group, coordinate.artifact, coordinate.version, classifier
                ),
            );
            if let PackageFile::Archive(archive) = &mut natives {
                archive.exclude = library.extract_excludes();
            }
            natives.set_dest_dir(self.paths.natives_dir());

            plan.entries.push(PlannedEntry {
                key: natives_path.clone(),
                location: join_location(&base.location, &natives_path),
                origin: Origin::Libraries,
                file: natives,
                verify: None,
            });
        }

        Ok(())
    }

    fn source(&self, origin: Origin) -> Result<&Source> {
        let source = match origin {
            Origin::Objects => self.objects.as_ref(),
            Origin::Libraries => self.libraries.as_ref(),
        };
        source.ok_or_else(|| {
            DeployError::config(match origin {
                Origin::Objects => "No objects location configured for file groups",
                Origin::Libraries => "No libraries location configured for libraries",
            })
        })
    }

    /// Cached at the planned version with everything it wrote still on disk
    fn is_up_to_date(
        &self,
        entry: &PlannedEntry,
        cache: &VersionCache,
        log: &UninstallLog,
    ) -> Result<bool> {
        if !cache.is_current(&entry.key, entry.file.version()) {
            return Ok(false);
        }
        if entry.file.is_archive() {
            return Ok(log
                .paths_for(&entry.key)
                .iter()
                .all(|path| log.resolve(path).exists()));
        }
        Ok(entry.final_path()?.exists())
    }

    fn deploy_entries(
        &self,
        entries: &[PlannedEntry],
        segment: &Segment,
        cancel: &CancelToken,
        cache: &mut VersionCache,
        log: &mut UninstallLog,
        report: &mut DeployReport,
    ) -> Result<()> {
        let count = entries.len();

        for entry in entries {
            cancel.check()?;

            let child = segment.split_each(1.0, count);
            child.set_title(entry.key.clone());

            if self.is_up_to_date(entry, cache, log)? {
                log::debug!("{} is up to date", entry.key);
                cache.touch(entry.key.clone());
                report.up_to_date.push(entry.key.clone());
                child.finish("Up to date");
                continue;
            }

            let staging = entry.staging_path()?;
            if let Some(parent) = staging.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| DeployError::deployment(&entry.key, parent, e))?;
            }

            child.set_status(format!("Downloading {}", entry.key));
            let request = ResourceRequest::new(&entry.key, &entry.location)
                .with_size(entry.file.size());
            let provider = &self.source(entry.origin)?.provider;

            if let Err(e) = provider.fetch(&request, &staging, &child, cancel) {
                self.artifact_failed(entry, &staging, e, cache, report)?;
                child.finish("Failed");
                continue;
            }

            child.set_must_confirm_cancel(true);
            let mut deploy_ctx = DeployContext {
                key: &entry.key,
                staging: &staging,
                verify: entry.verify,
                filters: self.filters.as_ref(),
                log: &mut *log,
                segment: &child,
                cancel,
            };
            let result = entry.file.deploy(&mut deploy_ctx);
            child.set_must_confirm_cancel(false);

            match result {
                Ok(outcome) => {
                    cache.put(entry.key.clone(), entry.file.version());
                    cache.touch(entry.key.clone());
                    if outcome == DeployOutcome::Kept {
                        report.kept.push(entry.key.clone());
                    } else {
                        report.deployed.push(entry.key.clone());
                    }
                    child.finish("Installed");
                }
                Err(e) => {
                    self.artifact_failed(entry, &staging, e, cache, report)?;
                    child.finish("Failed");
                }
            }
        }

        Ok(())
    }

    /// Record a per-artifact failure, or hand a fatal one back
    fn artifact_failed(
        &self,
        entry: &PlannedEntry,
        staging: &std::path::Path,
        error: DeployError,
        cache: &mut VersionCache,
        report: &mut DeployReport,
    ) -> Result<()> {
        // Only staging files may remain after cancellation
        if !error.is_cancelled() {
            remove_staging(staging);
        }
        if error.is_fatal() {
            return Err(error);
        }

        log::warn!("{}", error);
        cache.touch(entry.key.clone());
        report.failures.push(error);
        Ok(())
    }
}
