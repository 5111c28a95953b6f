//! Safe zip extraction
//!
//! Every entry is resolved against the target directory and rejected when its
//! normalized path would land outside it. Entries are recorded in the
//! uninstall log before they are written, and each entry is streamed into a
//! temporary file next to its destination that replaces it only once complete.

use super::uninstall_log::UninstallLog;
use crate::error::{DeployError, Result};
use crate::progress::{CancelToken, Progress, Segment};
use crate::utils::stream::copy_chunked;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use zip::ZipArchive;

/// Per-archive extraction options
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions<'a> {
    /// Entry name prefixes to skip
    pub exclude: &'a [String],
    /// Leave entries whose destination already exists untouched
    pub keep_existing: bool,
}

/// Counts of one extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub written: usize,
    pub kept: usize,
    pub skipped: usize,
}

/// Extract `archive_path` into `dest_dir` on behalf of artifact `key`
pub fn extract_zip(
    archive_path: &Path,
    dest_dir: &Path,
    key: &str,
    options: ExtractOptions<'_>,
    log: &mut UninstallLog,
    segment: &Segment,
    cancel: &CancelToken,
) -> Result<ExtractSummary> {
    log::debug!(
        "Extracting {} into {}",
        archive_path.display(),
        dest_dir.display()
    );

    let file = File::open(archive_path).map_err(|e| DeployError::deployment(key, archive_path, e))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| DeployError::deployment(key, archive_path, e))?;

    let root = absolute(dest_dir).map_err(|e| DeployError::deployment(key, dest_dir, e))?;
    let total = archive.len();
    let mut summary = ExtractSummary::default();

    for i in 0..total {
        cancel.check()?;

        let mut entry = archive
            .by_index(i)
            .map_err(|e| DeployError::deployment(key, archive_path, e))?;
        let name = entry.name().replace('\\', "/");

        if entry.is_dir() || is_meta_inf(&name) || is_excluded(&name, options.exclude) {
            summary.skipped += 1;
            continue;
        }

        let dest_path = resolve_entry(&root, &name).ok_or_else(|| {
            DeployError::deployment(
                key,
                &dest_dir.join(&name),
                format!("archive entry '{}' escapes the target directory", name),
            )
        })?;

        log.record(key, &dest_path)?;

        if options.keep_existing && dest_path.exists() {
            log::debug!("Keeping existing {}", dest_path.display());
            summary.kept += 1;
            continue;
        }

        let parent = dest_path.parent().unwrap_or(root.as_path());
        fs::create_dir_all(parent).map_err(|e| DeployError::deployment(key, parent, e))?;
        let mut staged =
            NamedTempFile::new_in(parent).map_err(|e| DeployError::deployment(key, parent, e))?;

        let size = entry.size();
        copy_chunked(
            &mut entry,
            staged.as_file_mut(),
            cancel,
            |copied| {
                let within = Progress::fraction(copied, size).value().unwrap_or(0.0);
                segment.set_progress(Progress::Determinate((i as f64 + within) / total as f64));
            },
            |e| DeployError::deployment(key, &dest_path, e),
        )?;

        // Set executable permission on Unix
        #[cfg(unix)]
        {
            if let Some(mode) = entry.unix_mode() {
                if mode & 0o111 != 0 {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(staged.path(), fs::Permissions::from_mode(0o755))
                        .map_err(|e| DeployError::deployment(key, &dest_path, e))?;
                }
            }
        }

        staged
            .persist(&dest_path)
            .map_err(|e| DeployError::deployment(key, &dest_path, e.error))?;

        summary.written += 1;
        segment.set_progress(Progress::fraction((i + 1) as u64, total as u64));
    }

    log::debug!(
        "Extracted {} file(s), kept {}, skipped {}",
        summary.written,
        summary.kept,
        summary.skipped
    );
    Ok(summary)
}

/// Whether a directory segment of `name` is `META-INF`
fn is_meta_inf(name: &str) -> bool {
    let mut segments: Vec<&str> = name.split('/').collect();
    segments.pop();
    segments.iter().any(|s| s.eq_ignore_ascii_case("META-INF"))
}

fn is_excluded(name: &str, exclude: &[String]) -> bool {
    exclude.iter().any(|prefix| name.starts_with(prefix.as_str()))
}

/// Resolve `name` under `root`, or `None` when it escapes `root`
pub fn resolve_entry(root: &Path, name: &str) -> Option<PathBuf> {
    let candidate = normalize(&root.join(name))?;
    if candidate.starts_with(root) && candidate != root {
        Some(candidate)
    } else {
        None
    }
}

/// Lexically normalize a path; `None` if `..` climbs above the root
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

/// Absolute, lexically normalized form of `path`
pub(crate) fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(normalize(&joined).unwrap_or(joined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::stream::CHUNK_SIZE;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn setup(temp: &TempDir) -> (PathBuf, UninstallLog) {
        let dest = temp.path().join("install");
        fs::create_dir_all(&dest).unwrap();
        let log = UninstallLog::load(dest.join(".state/uninstall.log"), &dest).unwrap();
        (dest, log)
    }

    fn options(exclude: &[String]) -> ExtractOptions<'_> {
        ExtractOptions {
            exclude,
            keep_existing: false,
        }
    }

    #[test]
    fn test_extract_and_record() {
        let temp = TempDir::new().unwrap();
        let (dest, mut log) = setup(&temp);
        let archive = temp.path().join("a.zip");
        write_zip(
            &archive,
            &[
                ("a.txt", b"a"),
                ("sub/b.txt", b"b"),
                ("META-INF/MANIFEST.MF", b"m"),
                ("skip/c.txt", b"c"),
            ],
        );

        let exclude = vec!["skip/".to_string()];
        let summary = extract_zip(
            &archive,
            &dest,
            "a.zip",
            options(&exclude),
            &mut log,
            &Segment::root(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(summary.written, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(fs::read(dest.join("sub/b.txt")).unwrap(), b"b");
        assert!(!dest.join("META-INF").exists());
        assert!(!dest.join("skip").exists());
        assert_eq!(log.paths_for("a.zip"), vec!["a.txt", "sub/b.txt"]);
    }

    #[test]
    fn test_path_traversal_rejected() {
        let temp = TempDir::new().unwrap();
        let (dest, mut log) = setup(&temp);
        let archive = temp.path().join("evil.zip");
        write_zip(&archive, &[("../../evil.sh", b"#!/bin/sh")]);

        let result = extract_zip(
            &archive,
            &dest,
            "evil.zip",
            options(&[]),
            &mut log,
            &Segment::root(),
            &CancelToken::new(),
        );

        assert!(matches!(result, Err(DeployError::Deployment { .. })));
        assert!(!temp.path().join("evil.sh").exists());
        assert!(log.is_empty());
    }

    #[test]
    fn test_keep_existing() {
        let temp = TempDir::new().unwrap();
        let (dest, mut log) = setup(&temp);
        fs::write(dest.join("options.txt"), "user").unwrap();
        let archive = temp.path().join("a.zip");
        write_zip(&archive, &[("options.txt", b"default"), ("new.txt", b"n")]);

        let summary = extract_zip(
            &archive,
            &dest,
            "a.zip",
            ExtractOptions {
                exclude: &[],
                keep_existing: true,
            },
            &mut log,
            &Segment::root(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(summary.kept, 1);
        assert_eq!(summary.written, 1);
        assert_eq!(fs::read_to_string(dest.join("options.txt")).unwrap(), "user");
        assert_eq!(log.paths_for("a.zip"), vec!["new.txt", "options.txt"]);
    }

    #[test]
    fn test_cancel_between_entries() {
        let temp = TempDir::new().unwrap();
        let (dest, mut log) = setup(&temp);
        let archive = temp.path().join("a.zip");
        write_zip(&archive, &[("a.txt", b"a")]);

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = extract_zip(
            &archive,
            &dest,
            "a.zip",
            options(&[]),
            &mut log,
            &Segment::root(),
            &cancel,
        );
        assert!(matches!(result, Err(DeployError::Cancelled)));
        assert!(!dest.join("a.txt").exists());
    }

    #[test]
    fn test_cancel_mid_entry_keeps_previous_file() {
        let temp = TempDir::new().unwrap();
        let (dest, mut log) = setup(&temp);
        fs::write(dest.join("big.bin"), "old").unwrap();
        let archive = temp.path().join("a.zip");
        let data = vec![1u8; CHUNK_SIZE * 4];
        write_zip(&archive, &[("big.bin", &data)]);

        // Cancel as soon as the first chunk of the entry has been written
        let cancel = CancelToken::new();
        let segment = Segment::root();
        let trigger = cancel.clone();
        segment.subscribe(move |snapshot| {
            if snapshot.progress.value().unwrap_or(0.0) > 0.0 {
                trigger.cancel();
            }
        });

        let result = extract_zip(
            &archive,
            &dest,
            "a.zip",
            options(&[]),
            &mut log,
            &segment,
            &cancel,
        );

        assert!(matches!(result, Err(DeployError::Cancelled)));
        assert_eq!(fs::read_to_string(dest.join("big.bin")).unwrap(), "old");
        let mut names: Vec<String> = fs::read_dir(&dest)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![".state", "big.bin"]);
    }

    #[test]
    fn test_resolve_entry() {
        let root = Path::new("/opt/app");
        assert_eq!(
            resolve_entry(root, "a/./b.txt"),
            Some(PathBuf::from("/opt/app/a/b.txt"))
        );
        assert_eq!(
            resolve_entry(root, "a/../b.txt"),
            Some(PathBuf::from("/opt/app/b.txt"))
        );
        assert_eq!(resolve_entry(root, "../app2/x"), None);
        assert_eq!(resolve_entry(root, "/etc/passwd"), None);
        assert_eq!(resolve_entry(root, "a/.."), None);
    }

    #[test]
    fn test_meta_inf_segments() {
        assert!(is_meta_inf("META-INF/MANIFEST.MF"));
        assert!(is_meta_inf("x/meta-inf/y"));
        assert!(!is_meta_inf("META-INF"));
        assert!(!is_meta_inf("data/file.txt"));
    }
}
