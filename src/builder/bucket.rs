//! Shared archives assembled from routed build inputs

use crate::error::{DeployError, Result};
use crate::signature::signature_of_archive;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Queue of files destined for one named archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveBucket {
    name: String,
    files: Vec<PathBuf>,
}

impl ArchiveBucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File name of the written archive
    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.name)
    }

    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write the queued files into a zip at `target` and return its signature
    ///
    /// Entry names are the files' paths relative to `base_dir` with `/`
    /// separators, in queue order. Timestamps are fixed so identical inputs
    /// produce identical bytes.
    pub fn write_contents(&self, base_dir: &Path, target: &Path) -> Result<String> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut zip = ZipWriter::new(BufWriter::new(File::create(target)?));

        for path in &self.files {
            let entry_name = relative_name(base_dir, path)?;
            let options = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .last_modified_time(DateTime::default())
                .unix_permissions(entry_mode(path));

            zip.start_file(entry_name.as_str(), options)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let mut reader = BufReader::new(File::open(path)?);
            io::copy(&mut reader, &mut zip)?;
        }

        let mut writer = zip
            .finish()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        writer.flush()?;

        log::debug!(
            "Wrote bucket '{}' with {} file(s) to {}",
            self.name,
            self.files.len(),
            target.display()
        );
        Ok(signature_of_archive(target)?)
    }
}

/// `/`-separated path of `path` below `base_dir`
pub fn relative_name(base_dir: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(base_dir).map_err(|_| {
        DeployError::config(format!(
            "{} is not inside {}",
            path.display(),
            base_dir.display()
        ))
    })?;

    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(unix)]
fn entry_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    match fs::metadata(path) {
        Ok(meta) if meta.permissions().mode() & 0o111 != 0 => 0o755,
        _ => 0o644,
    }
}

#[cfg(not(unix))]
fn entry_mode(_path: &Path) -> u32 {
    0o644
}
