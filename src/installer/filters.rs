//! Decoding filters for fetched content
//!
//! A package file may be stored encoded (e.g. `app.jar.xz.gz`). Its
//! `filters` list names the encodings innermost first, so decoding walks the
//! list from the end.

use crate::error::{DeployError, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use xz2::read::XzDecoder;

/// Turns a filter token into a decoding reader
pub trait FilterProvider: Send + Sync {
    /// Wrap `reader` so that reading yields the content decoded by `token`
    fn decode<'a>(&self, token: &str, reader: Box<dyn Read + 'a>) -> Result<Box<dyn Read + 'a>>;

    /// Whether `token` is known to this provider
    fn supports(&self, token: &str) -> bool;
}

/// gzip (`gz`) and xz (`xz`) decoding
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFilters;

impl FilterProvider for StandardFilters {
    fn decode<'a>(&self, token: &str, reader: Box<dyn Read + 'a>) -> Result<Box<dyn Read + 'a>> {
        match token {
            "gz" => Ok(Box::new(GzDecoder::new(reader))),
            "xz" => Ok(Box::new(XzDecoder::new(reader))),
            other => Err(DeployError::config(format!("Unknown filter '{}'", other))),
        }
    }

    fn supports(&self, token: &str) -> bool {
        matches!(token, "gz" | "xz")
    }
}

/// Apply every filter of `filters` to `reader`, outermost (last) first
pub fn decode_chain<'a>(
    provider: &dyn FilterProvider,
    filters: &[String],
    reader: Box<dyn Read + 'a>,
) -> Result<Box<dyn Read + 'a>> {
    let mut current = reader;
    for token in filters.iter().rev() {
        log::debug!("Applying filter '{}'", token);
        current = provider.decode(token, current)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};
    use xz2::write::XzEncoder;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn xz(data: &[u8]) -> Vec<u8> {
        let mut encoder = XzEncoder::new(Vec::new(), 6);
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn read_all(mut reader: Box<dyn Read + '_>) -> Vec<u8> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_no_filters_passes_through() {
        let data = b"plain".to_vec();
        let reader = decode_chain(&StandardFilters, &[], Box::new(Cursor::new(data))).unwrap();
        assert_eq!(read_all(reader), b"plain");
    }

    #[test]
    fn test_single_gzip() {
        let encoded = gzip(b"hello world");
        let filters = vec!["gz".to_string()];
        let reader =
            decode_chain(&StandardFilters, &filters, Box::new(Cursor::new(encoded))).unwrap();
        assert_eq!(read_all(reader), b"hello world");
    }

    #[test]
    fn test_chain_decodes_outermost_first() {
        // data.xz.gz: xz applied first, gzip last
        let encoded = gzip(&xz(b"layered"));
        let filters = vec!["xz".to_string(), "gz".to_string()];
        let reader =
            decode_chain(&StandardFilters, &filters, Box::new(Cursor::new(encoded))).unwrap();
        assert_eq!(read_all(reader), b"layered");
    }

    #[test]
    fn test_unknown_filter() {
        let filters = vec!["bz2".to_string()];
        let result = decode_chain(&StandardFilters, &filters, Box::new(Cursor::new(Vec::new())));
        assert!(matches!(result, Err(DeployError::Configuration(_))));
        assert!(!StandardFilters.supports("bz2"));
        assert!(StandardFilters.supports("xz"));
    }
}
