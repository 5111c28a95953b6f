//! Package builder for wendeploy
//!
//! This module handles:
//! - Loading the build configuration (wendeploy-build.toml)
//! - Routing every file of a source directory through the pattern list
//! - Writing standalone objects and shared archives into an output directory
//! - Emitting the manifest that describes them

pub mod bucket;
pub mod pattern;

// Re-export commonly used items
pub use bucket::ArchiveBucket;
pub use pattern::{PathRouter, PatternConfig, PatternRule, Route, RuleKind};

use crate::core::manifest::{
    validate_relative, ArchiveFile, Component, FileGroup, PackageFile, PackageManifest,
    SingleFile, VerifyMethod,
};
use crate::error::{DeployError, Result};
use crate::signature::signature_of_path;
use anyhow::Context;
use bucket::relative_name;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Default build configuration file name
pub const BUILD_CONFIG_FILE: &str = "wendeploy-build.toml";

/// Manifest file written at the root of the output directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Directory below the output root that holds the objects
pub const OBJECTS_DIR: &str = "objects";

fn default_verify() -> Option<VerifyMethod> {
    Some(VerifyMethod::Signature)
}

/// Settings for one package build, stored in wendeploy-build.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Release label written into the manifest
    #[serde(default)]
    pub version: String,

    /// Object prefix of the emitted file group
    #[serde(default)]
    pub source: String,

    /// Install-relative prefix of the emitted file group
    #[serde(default)]
    pub dest: String,

    /// Gzip standalone files and deliver them through the `gz` filter
    #[serde(default)]
    pub compress: bool,

    #[serde(default = "default_verify", skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerifyMethod>,

    /// Component gating the emitted file group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,

    #[serde(default)]
    pub patterns: Vec<PatternConfig>,
}

impl BuildConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            version: String::new(),
            source: String::new(),
            dest: String::new(),
            compress: false,
            verify: default_verify(),
            component: None,
            components: Vec::new(),
            patterns: Vec::new(),
        }
    }

    /// Load a build configuration
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read build config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse build config: {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize build config to TOML")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write build config: {}", path.display()))
    }

    /// Check names and the gating component
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DeployError::config("Build config needs a package name"));
        }
        validate_relative(&self.source)?;
        validate_relative(&self.dest)?;
        if let Some(id) = &self.component {
            if !self.components.iter().any(|c| &c.id == id) {
                return Err(DeployError::config(format!(
                    "Component '{}' is not declared in the build config",
                    id
                )));
            }
        }
        Ok(())
    }
}

/// Result of a build
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub manifest: PackageManifest,
    pub manifest_path: PathBuf,
    /// Files delivered as their own object
    pub standalone: usize,
    /// Shared archives written
    pub archives: usize,
    /// Files no pattern included
    pub excluded: usize,
}

/// Builds a package from a source directory
#[derive(Debug)]
pub struct PackageBuilder {
    config: BuildConfig,
    router: PathRouter,
    base_dir: PathBuf,
}

impl PackageBuilder {
    pub fn new(config: BuildConfig, base_dir: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        let router = PathRouter::from_config(&config.patterns)?;
        Ok(Self {
            config,
            router,
            base_dir: base_dir.into(),
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Write objects and the manifest into `out_dir`
    ///
    /// The output directory is skipped when it lies inside the source tree.
    pub fn build(&self, out_dir: &Path) -> Result<BuildReport> {
        let base = fs::canonicalize(&self.base_dir).map_err(|e| {
            DeployError::config(format!(
                "Source directory {} is not accessible: {}",
                self.base_dir.display(),
                e
            ))
        })?;
        fs::create_dir_all(out_dir)?;
        let out = fs::canonicalize(out_dir)?;

        log::info!("Building {} from {}", self.config.name, base.display());

        let mut standalone = Vec::new();
        let mut buckets: BTreeMap<String, ArchiveBucket> = BTreeMap::new();
        let mut excluded = 0;

        for entry in WalkDir::new(&base)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.path() != out)
        {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = relative_name(&base, entry.path())?;
            match self.router.route(&relative) {
                Route::Excluded => {
                    log::debug!("Excluded {}", relative);
                    excluded += 1;
                }
                Route::Standalone => standalone.push((relative, entry.into_path())),
                Route::Bucket(name) => buckets
                    .entry(name.clone())
                    .or_insert_with(|| ArchiveBucket::new(name))
                    .push(entry.into_path()),
            }
        }

        let objects_dir = self.objects_dir(&out);
        let mut group = FileGroup::new(self.config.source.clone(), self.config.dest.clone());
        group.verify = self.config.verify;
        group.component = self.config.component.clone();

        let mut names = BTreeSet::new();
        for (relative, _) in &standalone {
            claim_name(&mut names, self.object_name(relative))?;
        }
        for bucket in buckets.values() {
            claim_name(&mut names, bucket.archive_name())?;
        }

        for (relative, path) in &standalone {
            group
                .files
                .push(self.write_standalone(relative, path, &objects_dir)?);
        }

        for bucket in buckets.values() {
            let archive_name = bucket.archive_name();
            let target = objects_dir.join(&archive_name);
            let version = bucket.write_contents(&base, &target)?;
            let size = fs::metadata(&target)?.len();
            log::info!("Packed {} file(s) into {}", bucket.len(), archive_name);

            group.files.push(PackageFile::Archive(ArchiveFile {
                name: archive_name,
                filters: Vec::new(),
                size,
                platform: None,
                version,
                component: None,
                overwrite: None,
                exclude: Vec::new(),
                dest_dir: None,
            }));
        }

        let mut manifest = PackageManifest::new(self.config.name.clone());
        manifest.title = self.config.title.clone();
        manifest.version = self.config.version.clone();
        manifest.objects_location = Some(OBJECTS_DIR.to_string());
        manifest.components = self.config.components.clone();
        manifest.groups.push(group);
        manifest.validate()?;

        let manifest_path = out.join(MANIFEST_FILE);
        manifest.save(&manifest_path)?;
        log::info!("Wrote manifest to {}", manifest_path.display());

        Ok(BuildReport {
            manifest,
            manifest_path,
            standalone: standalone.len(),
            archives: buckets.len(),
            excluded,
        })
    }

    fn objects_dir(&self, out: &Path) -> PathBuf {
        self.config
            .source
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(out.join(OBJECTS_DIR), |dir, part| dir.join(part))
    }

    /// Object name of a standalone file
    fn object_name(&self, relative: &str) -> String {
        if self.config.compress {
            format!("{}.gz", relative)
        } else {
            relative.to_string()
        }
    }

    /// Copy or gzip one standalone file into the objects directory
    fn write_standalone(&self, relative: &str, path: &Path, objects_dir: &Path) -> Result<PackageFile> {
        // Versions describe the decoded content
        let version = signature_of_path(path)?;

        let name = self.object_name(relative);
        let filters = if self.config.compress {
            vec!["gz".to_string()]
        } else {
            Vec::new()
        };

        let target = objects_dir.join(&name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        if self.config.compress {
            let mut reader = BufReader::new(File::open(path)?);
            let mut encoder =
                GzEncoder::new(BufWriter::new(File::create(&target)?), Compression::default());
            io::copy(&mut reader, &mut encoder)?;
            encoder.finish()?.flush()?;
        } else {
            fs::copy(path, &target)?;
        }
        log::debug!("Wrote object {}", name);

        Ok(PackageFile::File(SingleFile {
            name,
            filters,
            size: fs::metadata(&target)?.len(),
            platform: None,
            version,
            component: None,
            overwrite: None,
            dest_dir: None,
        }))
    }
}

fn claim_name(names: &mut BTreeSet<String>, name: String) -> Result<()> {
    validate_relative(&name)?;
    if names.contains(&name) {
        return Err(DeployError::config(format!(
            "Object '{}' is produced twice; rename the archive or the file",
            name
        )));
    }
    names.insert(name);
    Ok(())
}
