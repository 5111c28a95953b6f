//! Chunked copying with cancellation checks

use crate::error::{DeployError, Result};
use crate::progress::CancelToken;
use std::io::{Read, Write};

/// Copy buffer size
pub const CHUNK_SIZE: usize = 8192;

/// Copy `reader` into `writer` one chunk at a time
///
/// `cancel` is checked before every chunk, `on_chunk` receives the running
/// byte count after every write, and `on_io` maps I/O failures to the error
/// that fits the caller's stage (fetch vs deployment).
pub fn copy_chunked<R, W, P, E>(
    reader: &mut R,
    writer: &mut W,
    cancel: &CancelToken,
    mut on_chunk: P,
    on_io: E,
) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    P: FnMut(u64),
    E: Fn(std::io::Error) -> DeployError,
{
    let mut buffer = vec![0; CHUNK_SIZE];
    let mut copied = 0u64;

    loop {
        cancel.check()?;

        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(on_io(e)),
        };

        writer.write_all(&buffer[..n]).map_err(&on_io)?;
        copied += n as u64;
        on_chunk(copied);
    }

    writer.flush().map_err(&on_io)?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_copy_reports_progress() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 10];
        let mut out = Vec::new();
        let mut seen = Vec::new();

        let copied = copy_chunked(
            &mut Cursor::new(&data),
            &mut out,
            &CancelToken::new(),
            |n| seen.push(n),
            DeployError::Io,
        )
        .unwrap();

        assert_eq!(copied, data.len() as u64);
        assert_eq!(out, data);
        assert_eq!(seen.last().copied(), Some(data.len() as u64));
    }

    #[test]
    fn test_copy_stops_when_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut out = Vec::new();

        let result = copy_chunked(
            &mut Cursor::new(vec![1u8; 100]),
            &mut out,
            &cancel,
            |_| {},
            DeployError::Io,
        );

        assert!(matches!(result, Err(DeployError::Cancelled)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_io_error_mapped() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
            }
        }

        let result = copy_chunked(
            &mut Broken,
            &mut Vec::new(),
            &CancelToken::new(),
            |_| {},
            |e| DeployError::fetch("k", e),
        );
        assert!(matches!(result, Err(DeployError::Fetch { .. })));
    }
}
