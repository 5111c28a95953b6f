//! Manifest data structures for wendeploy
//!
//! This module defines the package description consumed by the deployment
//! engine:
//! - `PackageManifest`: root document (components, file groups, libraries)
//! - `FileGroup`: files sharing a remote source prefix and local dest prefix
//! - `PackageFile`: a single file or an archive to extract
//! - `Component`: optional installable unit gating file groups

use super::library::Library;
use super::platform::Os;
use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Highest manifest format this engine understands
pub const MANIFEST_FORMAT: u32 = 1;

fn default_format() -> u32 {
    MANIFEST_FORMAT
}

/// What to do when the destination already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverwritePolicy {
    /// Keep an existing destination untouched
    #[serde(alias = "never-overwrite")]
    Never,
}

/// How fetched content is checked before it is committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMethod {
    /// Content signature must equal the declared version
    Signature,
    /// Staged byte count must equal the declared size
    Size,
}

/// Optional installable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Selected unless the user opts out
    #[serde(default)]
    pub selected: bool,

    /// Always selected
    #[serde(default)]
    pub required: bool,
}

impl Component {
    pub fn is_selected(&self) -> bool {
        self.required || self.selected
    }
}

/// A file delivered as-is (after decoding filters)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleFile {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,

    #[serde(default)]
    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Os>,

    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<OverwritePolicy>,

    #[serde(skip)]
    pub(crate) dest_dir: Option<PathBuf>,
}

/// An archive extracted into its destination directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveFile {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,

    #[serde(default)]
    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Os>,

    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<OverwritePolicy>,

    /// Entry name prefixes that are not extracted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,

    #[serde(skip)]
    pub(crate) dest_dir: Option<PathBuf>,
}

/// A deployable file of a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PackageFile {
    File(SingleFile),
    Archive(ArchiveFile),
}

impl PackageFile {
    /// Plain file with default options
    pub fn file(name: impl Into<String>, version: impl Into<String>) -> Self {
        PackageFile::File(SingleFile {
            name: name.into(),
            filters: Vec::new(),
            size: 0,
            platform: None,
            version: version.into(),
            component: None,
            overwrite: None,
            dest_dir: None,
        })
    }

    /// Archive with default options
    pub fn archive(name: impl Into<String>, version: impl Into<String>) -> Self {
        PackageFile::Archive(ArchiveFile {
            name: name.into(),
            filters: Vec::new(),
            size: 0,
            platform: None,
            version: version.into(),
            component: None,
            overwrite: None,
            exclude: Vec::new(),
            dest_dir: None,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            PackageFile::File(f) => &f.name,
            PackageFile::Archive(a) => &a.name,
        }
    }

    pub fn filters(&self) -> &[String] {
        match self {
            PackageFile::File(f) => &f.filters,
            PackageFile::Archive(a) => &a.filters,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            PackageFile::File(f) => f.size,
            PackageFile::Archive(a) => a.size,
        }
    }

    pub fn platform(&self) -> Option<Os> {
        match self {
            PackageFile::File(f) => f.platform,
            PackageFile::Archive(a) => a.platform,
        }
    }

    pub fn version(&self) -> &str {
        match self {
            PackageFile::File(f) => &f.version,
            PackageFile::Archive(a) => &a.version,
        }
    }

    pub fn component(&self) -> Option<&str> {
        match self {
            PackageFile::File(f) => f.component.as_deref(),
            PackageFile::Archive(a) => a.component.as_deref(),
        }
    }

    pub fn overwrite(&self) -> Option<OverwritePolicy> {
        match self {
            PackageFile::File(f) => f.overwrite,
            PackageFile::Archive(a) => a.overwrite,
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, PackageFile::Archive(_))
    }

    /// Name with every filter suffix stripped, outermost first
    ///
    /// `app.jar.xz` with filters `["xz"]` becomes `app.jar`.
    pub fn final_filename(&self) -> Result<String> {
        strip_filters(self.name(), self.filters())
    }

    /// Bind this file to the directory it deploys into
    pub fn set_dest_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = Some(dir.into());
        match self {
            PackageFile::File(f) => f.dest_dir = dir,
            PackageFile::Archive(a) => a.dest_dir = dir,
        }
    }

    pub fn dest_dir(&self) -> Option<&Path> {
        match self {
            PackageFile::File(f) => f.dest_dir.as_deref(),
            PackageFile::Archive(a) => a.dest_dir.as_deref(),
        }
    }

    /// Check the name/filters pair and the relative name
    pub fn validate(&self) -> Result<()> {
        let final_name = self.final_filename()?;
        validate_relative(&final_name)?;
        if self.version().trim().is_empty() {
            return Err(DeployError::config(format!(
                "File '{}' has an empty version",
                self.name()
            )));
        }
        Ok(())
    }
}

/// Strip `.token` suffixes from `name`, last filter first
pub fn strip_filters(name: &str, filters: &[String]) -> Result<String> {
    let mut current = name;
    for token in filters.iter().rev() {
        let suffix = format!(".{}", token);
        current = current.strip_suffix(&suffix).ok_or_else(|| {
            DeployError::config(format!(
                "File '{}' does not end with filter extension '{}'",
                name, suffix
            ))
        })?;
    }

    if current.is_empty() {
        return Err(DeployError::config(format!(
            "File '{}' has no name left after removing filter extensions",
            name
        )));
    }
    Ok(current.to_string())
}

/// Reject absolute paths and parent components in manifest-relative paths
pub(crate) fn validate_relative(path: &str) -> Result<()> {
    let escapes = path.starts_with('/')
        || path.starts_with('\\')
        || path.contains(':')
        || path.split(['/', '\\']).any(|part| part == "..");
    if escapes {
        return Err(DeployError::config(format!(
            "Path '{}' must be relative and stay inside the install directory",
            path
        )));
    }
    Ok(())
}

/// Join manifest path segments with `/`, skipping empty ones
pub fn join_relative(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Files sharing a remote source prefix and a local dest prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileGroup {
    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub dest: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerifyMethod>,

    /// Component gating every file of the group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    #[serde(default)]
    pub files: Vec<PackageFile>,
}

impl FileGroup {
    pub fn new(source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            verify: None,
            component: None,
            files: Vec::new(),
        }
    }

    /// Remote location of `file`, relative to the objects base
    pub fn source_path(&self, file: &PackageFile) -> String {
        join_relative(&[&self.source, file.name()])
    }

    /// Install-relative path of `file`; also its version cache key
    pub fn dest_path(&self, file: &PackageFile) -> Result<String> {
        Ok(join_relative(&[&self.dest, &file.final_filename()?]))
    }

    /// Component gating `file`: its own, else the group's
    pub fn component_of<'a>(&'a self, file: &'a PackageFile) -> Option<&'a str> {
        file.component().or(self.component.as_deref())
    }
}

/// Root package description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default = "default_format")]
    pub minimum_version: u32,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Release label
    #[serde(default)]
    pub version: String,

    /// Base for file group sources, relative to the manifest location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects_location: Option<String>,

    /// Base for library paths, relative to the manifest location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libraries_location: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,

    #[serde(default)]
    pub groups: Vec<FileGroup>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<Library>,
}

impl PackageManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            minimum_version: MANIFEST_FORMAT,
            name: name.into(),
            title: None,
            version: String::new(),
            objects_location: None,
            libraries_location: None,
            components: Vec::new(),
            groups: Vec::new(),
            libraries: Vec::new(),
        }
    }

    /// Parse and validate a manifest document
    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(content)
            .map_err(|e| DeployError::config(format!("Failed to parse manifest: {}", e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load a manifest from a local file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DeployError::config(format!("Failed to read manifest {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Save the manifest as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DeployError::config(format!("Failed to serialize manifest: {}", e)))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Check format version, names, components and rules
    pub fn validate(&self) -> Result<()> {
        if self.minimum_version > MANIFEST_FORMAT {
            return Err(DeployError::config(format!(
                "Manifest '{}' requires format {} but only {} is supported",
                self.name, self.minimum_version, MANIFEST_FORMAT
            )));
        }

        for group in &self.groups {
            if !group.dest.is_empty() {
                validate_relative(&group.dest)?;
            }
            if let Some(id) = &group.component {
                self.require_component(id)?;
            }
            for file in &group.files {
                file.validate()?;
                if let Some(id) = file.component() {
                    self.require_component(id)?;
                }
            }
        }

        for library in &self.libraries {
            library.validate()?;
        }

        Ok(())
    }

    fn require_component(&self, id: &str) -> Result<()> {
        if self.component(id).is_none() {
            return Err(DeployError::config(format!(
                "Unknown component '{}' referenced in manifest '{}'",
                id, self.name
            )));
        }
        Ok(())
    }

    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Total declared size of all files and libraries
    pub fn total_size(&self) -> u64 {
        let files: u64 = self
            .groups
            .iter()
            .flat_map(|g| g.files.iter())
            .map(|f| f.size())
            .sum();
        let libraries: u64 = self.libraries.iter().map(|l| l.size).sum();
        files + libraries
    }

    /// Number of artifacts the manifest describes
    pub fn download_count(&self) -> usize {
        self.groups.iter().map(|g| g.files.len()).sum::<usize>() + self.libraries.len()
    }
}
