//! Deploying a fetched package file
//!
//! This module handles:
//! - Decoding the staged download through the file's filter chain
//! - Verifying size or signature before anything is committed
//! - Atomically replacing single files
//! - Extracting archives into their destination directory

use super::extractor::{extract_zip, ExtractOptions, ExtractSummary};
use super::filters::{decode_chain, FilterProvider};
use super::uninstall_log::UninstallLog;
use crate::core::manifest::{ArchiveFile, OverwritePolicy, PackageFile, SingleFile, VerifyMethod};
use crate::error::{DeployError, Result};
use crate::progress::{CancelToken, Segment};
use crate::signature::{signature_of_archive, signature_of_named};
use crate::utils::stream::copy_chunked;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tempfile::NamedTempFile;

/// Everything `deploy` needs besides the file itself
pub struct DeployContext<'a> {
    /// Version cache key of the artifact
    pub key: &'a str,
    /// Downloaded, still encoded content
    pub staging: &'a Path,
    pub verify: Option<VerifyMethod>,
    pub filters: &'a dyn FilterProvider,
    pub log: &'a mut UninstallLog,
    pub segment: &'a Segment,
    pub cancel: &'a CancelToken,
}

/// What a deployment did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Single file written
    Written,
    /// Existing destination kept because of `overwrite: never`
    Kept,
    /// Archive extracted
    Extracted(ExtractSummary),
}

impl PackageFile {
    /// Decode, verify and commit the staged content
    ///
    /// The staging file is removed once the content is committed. Every file
    /// is replaced atomically: on error a single file is left untouched, and an
    /// archive keeps the entries committed so far with no partial entry.
    pub fn deploy(&self, ctx: &mut DeployContext<'_>) -> Result<DeployOutcome> {
        let final_name = self.final_filename()?;
        let dest_dir = self.dest_dir().ok_or_else(|| {
            DeployError::config(format!("File '{}' has no destination directory", self.name()))
        })?;
        ctx.segment.set_status(format!("Installing {}", final_name));

        let outcome = match self {
            PackageFile::File(file) => deploy_single(file, &final_name, dest_dir, ctx)?,
            PackageFile::Archive(archive) => deploy_archive(archive, &final_name, dest_dir, ctx)?,
        };

        remove_staging(ctx.staging);
        Ok(outcome)
    }
}

fn deploy_single(
    file: &SingleFile,
    final_name: &str,
    dest_dir: &Path,
    ctx: &mut DeployContext<'_>,
) -> Result<DeployOutcome> {
    let dest = dest_dir.join(final_name);
    ctx.log.record(ctx.key, &dest)?;

    if file.overwrite == Some(OverwritePolicy::Never) && dest.exists() {
        log::info!("Keeping existing {}", dest.display());
        return Ok(DeployOutcome::Kept);
    }

    verify_size(ctx, file.size)?;

    let parent = dest.parent().unwrap_or(dest_dir);
    fs::create_dir_all(parent).map_err(|e| DeployError::deployment(ctx.key, parent, e))?;
    let mut temp =
        NamedTempFile::new_in(parent).map_err(|e| DeployError::deployment(ctx.key, parent, e))?;

    decode_into(ctx, &file.filters, temp.as_file_mut(), &dest)?;

    if ctx.verify == Some(VerifyMethod::Signature) {
        let actual = signature_of_named(temp.path(), final_name)
            .map_err(|e| DeployError::deployment(ctx.key, &dest, e))?;
        check_signature(ctx.key, &file.version, actual)?;
    }

    temp.persist(&dest)
        .map_err(|e| DeployError::deployment(ctx.key, &dest, e.error))?;
    log::debug!("Installed {}", dest.display());
    Ok(DeployOutcome::Written)
}

fn deploy_archive(
    archive: &ArchiveFile,
    final_name: &str,
    dest_dir: &Path,
    ctx: &mut DeployContext<'_>,
) -> Result<DeployOutcome> {
    verify_size(ctx, archive.size)?;

    // Filtered archives are decoded next to the staging file first
    let decoded = if archive.filters.is_empty() {
        None
    } else {
        let dir = ctx.staging.parent().unwrap_or(dest_dir);
        let mut temp =
            NamedTempFile::new_in(dir).map_err(|e| DeployError::deployment(ctx.key, dir, e))?;
        let target = dest_dir.join(final_name);
        decode_into(ctx, &archive.filters, temp.as_file_mut(), &target)?;
        Some(temp)
    };
    let archive_path = decoded
        .as_ref()
        .map(|temp| temp.path())
        .unwrap_or(ctx.staging);

    if ctx.verify == Some(VerifyMethod::Signature) {
        let actual = signature_of_archive(archive_path)
            .map_err(|e| DeployError::deployment(ctx.key, archive_path, e))?;
        check_signature(ctx.key, &archive.version, actual)?;
    }

    fs::create_dir_all(dest_dir).map_err(|e| DeployError::deployment(ctx.key, dest_dir, e))?;
    let summary = extract_zip(
        archive_path,
        dest_dir,
        ctx.key,
        ExtractOptions {
            exclude: &archive.exclude,
            keep_existing: archive.overwrite == Some(OverwritePolicy::Never),
        },
        ctx.log,
        ctx.segment,
        ctx.cancel,
    )?;

    Ok(DeployOutcome::Extracted(summary))
}

/// Stream the staged content through `filters` into `out`
fn decode_into(
    ctx: &DeployContext<'_>,
    filters: &[String],
    out: &mut File,
    target: &Path,
) -> Result<u64> {
    let staged = File::open(ctx.staging)
        .map_err(|e| DeployError::deployment(ctx.key, ctx.staging, e))?;
    let mut reader = decode_chain(ctx.filters, filters, Box::new(BufReader::new(staged)))?;
    copy_chunked(&mut reader, out, ctx.cancel, |_| {}, |e| {
        DeployError::deployment(ctx.key, target, e)
    })
}

fn verify_size(ctx: &DeployContext<'_>, expected: u64) -> Result<()> {
    if ctx.verify != Some(VerifyMethod::Size) {
        return Ok(());
    }

    let actual = fs::metadata(ctx.staging)
        .map_err(|e| DeployError::deployment(ctx.key, ctx.staging, e))?
        .len();
    if actual != expected {
        return Err(DeployError::Integrity {
            key: ctx.key.to_string(),
            expected: format!("{} bytes", expected),
            actual: format!("{} bytes", actual),
        });
    }
    Ok(())
}

fn check_signature(key: &str, expected: &str, actual: String) -> Result<()> {
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(DeployError::Integrity {
            key: key.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Remove a staging file, ignoring a missing one
pub fn remove_staging(staging: &Path) {
    if let Err(e) = fs::remove_file(staging) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove {}: {}", staging.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::filters::StandardFilters;
    use crate::signature::signature_of_bytes;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    struct Fixture {
        temp: TempDir,
        install: PathBuf,
        log: UninstallLog,
        segment: Segment,
        cancel: CancelToken,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let install = temp.path().join("install");
            fs::create_dir_all(&install).unwrap();
            let log = UninstallLog::load(install.join(".state/uninstall.log"), &install).unwrap();
            Self {
                temp,
                install,
                log,
                segment: Segment::root(),
                cancel: CancelToken::new(),
            }
        }

        fn stage(&self, name: &str, data: &[u8]) -> PathBuf {
            let path = self.temp.path().join(format!("{}.tmp", name));
            fs::write(&path, data).unwrap();
            path
        }

        fn deploy(
            &mut self,
            file: &PackageFile,
            staging: &Path,
            verify: Option<VerifyMethod>,
        ) -> Result<DeployOutcome> {
            let mut ctx = DeployContext {
                key: "key",
                staging,
                verify,
                filters: &StandardFilters,
                log: &mut self.log,
                segment: &self.segment,
                cancel: &self.cancel,
            };
            file.deploy(&mut ctx)
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_single_file_with_filter() {
        let mut fx = Fixture::new();
        let mut file = PackageFile::file("bin/app.txt.gz", signature_of_bytes(b"payload"));
        if let PackageFile::File(f) = &mut file {
            f.filters = vec!["gz".into()];
        }
        file.set_dest_dir(&fx.install);
        let staging = fx.stage("app", &gzip(b"payload"));

        let outcome = fx
            .deploy(&file, &staging, Some(VerifyMethod::Signature))
            .unwrap();

        assert_eq!(outcome, DeployOutcome::Written);
        assert_eq!(fs::read(fx.install.join("bin/app.txt")).unwrap(), b"payload");
        assert!(!staging.exists());
        assert_eq!(fx.log.paths_for("key"), vec!["bin/app.txt"]);
    }

    #[test]
    fn test_signature_mismatch_commits_nothing() {
        let mut fx = Fixture::new();
        let mut file = PackageFile::file("a.txt", "0000");
        file.set_dest_dir(&fx.install);
        fs::write(fx.install.join("a.txt"), "old").unwrap();
        let staging = fx.stage("a", b"new");

        let err = fx
            .deploy(&file, &staging, Some(VerifyMethod::Signature))
            .unwrap_err();

        assert!(matches!(err, DeployError::Integrity { .. }));
        assert!(!err.is_fatal());
        assert_eq!(fs::read_to_string(fx.install.join("a.txt")).unwrap(), "old");
    }

    #[test]
    fn test_size_verification() {
        let mut fx = Fixture::new();
        let mut file = PackageFile::file("a.txt", "v1");
        if let PackageFile::File(f) = &mut file {
            f.size = 99;
        }
        file.set_dest_dir(&fx.install);
        let staging = fx.stage("a", b"short");

        let err = fx.deploy(&file, &staging, Some(VerifyMethod::Size)).unwrap_err();
        assert!(matches!(err, DeployError::Integrity { .. }));
        assert!(!fx.install.join("a.txt").exists());
    }

    #[test]
    fn test_never_overwrite_keeps_bytes_but_logs() {
        let mut fx = Fixture::new();
        let mut file = PackageFile::file("options.txt", "v2");
        if let PackageFile::File(f) = &mut file {
            f.overwrite = Some(OverwritePolicy::Never);
        }
        file.set_dest_dir(&fx.install);
        fs::write(fx.install.join("options.txt"), "user settings").unwrap();
        let staging = fx.stage("options", b"defaults");

        let outcome = fx.deploy(&file, &staging, None).unwrap();

        assert_eq!(outcome, DeployOutcome::Kept);
        assert_eq!(
            fs::read_to_string(fx.install.join("options.txt")).unwrap(),
            "user settings"
        );
        assert_eq!(fx.log.paths_for("key"), vec!["options.txt"]);
        assert!(!staging.exists());
    }

    #[test]
    fn test_archive_deploy() {
        let mut fx = Fixture::new();
        let bytes = zip_bytes(&[("data/a.txt", b"a"), ("META-INF/x", b"x")]);
        let staging = fx.stage("pack", &bytes);
        let version = signature_of_archive(&staging).unwrap();

        let mut file = PackageFile::archive("pack.zip", version);
        file.set_dest_dir(fx.install.join("game"));

        let outcome = fx
            .deploy(&file, &staging, Some(VerifyMethod::Signature))
            .unwrap();

        match outcome {
            DeployOutcome::Extracted(summary) => assert_eq!(summary.written, 1),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(fs::read(fx.install.join("game/data/a.txt")).unwrap(), b"a");
        assert!(!staging.exists());
    }

    #[test]
    fn test_filtered_archive_deploy() {
        let mut fx = Fixture::new();
        let bytes = zip_bytes(&[("b.txt", b"b")]);
        let staging = fx.stage("pack", &gzip(&bytes));

        let mut file = PackageFile::archive("pack.zip.gz", "unused");
        if let PackageFile::Archive(a) = &mut file {
            a.filters = vec!["gz".into()];
        }
        file.set_dest_dir(&fx.install);

        fx.deploy(&file, &staging, None).unwrap();
        assert_eq!(fs::read(fx.install.join("b.txt")).unwrap(), b"b");
    }

    #[test]
    fn test_missing_dest_dir() {
        let mut fx = Fixture::new();
        let file = PackageFile::file("a.txt", "v");
        let staging = fx.stage("a", b"a");
        let err = fx.deploy(&file, &staging, None).unwrap_err();
        assert!(matches!(err, DeployError::Configuration(_)));
    }
}
