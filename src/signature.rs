//! Content signatures used as artifact versions
//!
//! A signature is a lowercase hex SHA-256 digest:
//! - plain files: digest of the byte stream
//! - zip/jar archives: digest over the entries sorted by name, each fed as
//!   `name ‖ 0x00 ‖ hex(digest(entry bytes))`
//!
//! Archive signatures ignore entry order, timestamps and compression level, so
//! repacking identical contents yields the same version.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use zip::ZipArchive;

/// File extensions treated as archives when computing signatures
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "jar"];

/// Check whether a file name denotes an archive for signature purposes
pub fn is_archive_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            ARCHIVE_EXTENSIONS
                .iter()
                .any(|a| a.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Signature of an in-memory byte slice
pub fn signature_of_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Signature of everything readable from `reader`
pub fn signature_of_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Signature of a plain file's bytes
pub fn signature_of_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    signature_of_reader(&mut reader)
}

/// Order-independent signature of a zip archive's entries
pub fn signature_of_archive(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let digest = signature_of_reader(&mut entry)?;
        entries.push((name, digest));
    }

    Ok(combine_entries(entries))
}

/// Signature of a file, dispatching on its extension
pub fn signature_of_path(path: &Path) -> io::Result<String> {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    signature_of_named(path, name)
}

/// Signature of `path`, classifying it by `name` instead of its own file name
///
/// Used for staging files whose on-disk name carries a temporary suffix.
pub fn signature_of_named(path: &Path, name: &str) -> io::Result<String> {
    if is_archive_name(name) {
        signature_of_archive(path)
    } else {
        signature_of_file(path)
    }
}

fn combine_entries(mut entries: Vec<(String, String)>) -> String {
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (name, digest) in &entries {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(digest.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn write_zip(path: &Path, entries: &[(&str, &[u8])], method: CompressionMethod) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        let options = FileOptions::default().compression_method(method);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_signature_of_bytes() {
        // Known SHA-256 of "abc"
        assert_eq!(
            signature_of_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_reader_matches_bytes() {
        let data = vec![7u8; 20_000];
        let mut cursor = std::io::Cursor::new(data.clone());
        assert_eq!(
            signature_of_reader(&mut cursor).unwrap(),
            signature_of_bytes(&data)
        );
    }

    #[test]
    fn test_archive_signature_is_order_independent() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.zip");
        let b = temp.path().join("b.zip");

        write_zip(
            &a,
            &[("one.txt", b"1"), ("dir/two.txt", b"22"), ("three", b"333")],
            CompressionMethod::Deflated,
        );
        write_zip(
            &b,
            &[("three", b"333"), ("one.txt", b"1"), ("dir/two.txt", b"22")],
            CompressionMethod::Stored,
        );

        assert_eq!(
            signature_of_archive(&a).unwrap(),
            signature_of_archive(&b).unwrap()
        );
    }

    #[test]
    fn test_archive_signature_detects_content_change() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.zip");
        let b = temp.path().join("b.zip");

        write_zip(&a, &[("one.txt", b"1")], CompressionMethod::Stored);
        write_zip(&b, &[("one.txt", b"2")], CompressionMethod::Stored);

        assert_ne!(
            signature_of_archive(&a).unwrap(),
            signature_of_archive(&b).unwrap()
        );
    }

    #[test]
    fn test_path_dispatch() {
        let temp = TempDir::new().unwrap();
        let jar = temp.path().join("lib.JAR");
        write_zip(&jar, &[("x", b"x")], CompressionMethod::Stored);
        assert_eq!(
            signature_of_path(&jar).unwrap(),
            signature_of_archive(&jar).unwrap()
        );

        let txt = temp.path().join("notes.txt");
        std::fs::write(&txt, b"hello").unwrap();
        assert_eq!(signature_of_path(&txt).unwrap(), signature_of_bytes(b"hello"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        assert!(signature_of_path(&temp.path().join("missing.zip")).is_err());
    }

    #[test]
    fn test_is_archive_name() {
        assert!(is_archive_name("pack.zip"));
        assert!(is_archive_name("lib.Jar"));
        assert!(!is_archive_name("readme.md"));
        assert!(!is_archive_name("zip"));
    }
}
