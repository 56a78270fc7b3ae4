//! Streaming file content scanner: CRC32 hash and line count in one pass.

use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::Path;

/// Size of the read buffer. Bounds peak memory regardless of file size.
const CHUNK_SIZE: usize = 32 * 1024;

/// Result of one content scan; each field is present only when requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentStats {
    /// CRC32 of the content, IEEE polynomial. Empty input hashes to 0.
    pub crc32: Option<u32>,
    /// Number of `\n` bytes in the content. A file whose last line lacks a
    /// trailing newline is counted one short; this is the published contract
    /// of the metric, not an off-by-one to fix.
    pub lines: Option<u64>,
}

/// Scans a file once, computing the requested content statistics.
///
/// The file is read in fixed-size chunks and the handle is released on every
/// exit path. Any read error aborts the scan: partial results are never
/// returned.
pub fn scan_content(path: &Path, want_crc32: bool, want_lines: bool) -> io::Result<ContentStats> {
    let mut file = File::open(path)?;

    let mut hasher = want_crc32.then(crc32fast::Hasher::new);
    let mut lines: u64 = 0;
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let read = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let chunk = &buf[..read];
        if want_lines {
            lines += chunk.iter().filter(|&&b| b == b'\n').count() as u64;
        }
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(chunk);
        }
    }

    Ok(ContentStats {
        crc32: hasher.map(|h| h.finalize()),
        lines: want_lines.then_some(lines),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    #[test]
    fn line_count_equals_newline_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let with_trailing = write_file(&dir, "a", b"a\nb\nc\n");
        let without_trailing = write_file(&dir, "b", b"a\nb\nc");

        let stats = scan_content(&with_trailing, false, true).unwrap();
        assert_eq!(stats.lines, Some(3));
        assert_eq!(stats.crc32, None);

        let stats = scan_content(&without_trailing, false, true).unwrap();
        assert_eq!(stats.lines, Some(2));
    }

    #[test]
    fn empty_file_hashes_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "empty", b"");

        let stats = scan_content(&path, true, true).unwrap();
        assert_eq!(stats.crc32, Some(0));
        assert_eq!(stats.lines, Some(0));
    }

    #[test]
    fn crc32_matches_ieee_check_value() {
        // The classic CRC-32/IEEE check input.
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "check", b"123456789");

        let stats = scan_content(&path, true, false).unwrap();
        assert_eq!(stats.crc32, Some(0xCBF4_3926));
        assert_eq!(stats.lines, None);
    }

    #[test]
    fn scan_is_idempotent_on_unmodified_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "stable", b"one\ntwo\nthree\n");

        let first = scan_content(&path, true, true).unwrap();
        let second = scan_content(&path, true, true).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn large_file_spans_multiple_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let content = b"0123456789abcde\n".repeat(5000); // 80000 bytes > one chunk
        let path = write_file(&dir, "large", &content);

        let stats = scan_content(&path, true, true).unwrap();
        assert_eq!(stats.lines, Some(5000));
        assert_eq!(stats.crc32, Some(crc32fast::hash(&content)));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(scan_content(Path::new("/nonexistent/fstatd-test"), true, true).is_err());
    }
}
