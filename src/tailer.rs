//! Byte-cursor tailing of append-only log files.
//!
//! Reads exactly one line per call so the extraction cycle can throttle
//! ingestion to one record per stream per cycle. The cursor is advanced by
//! the caller using the raw byte count, which is taken before decoding so a
//! line full of undecodable bytes is still consumed and never retried.

use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

/// One tailed line and the number of raw bytes it occupied on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailedLine {
    /// Lossily decoded content with trailing whitespace removed.
    pub text: String,
    /// Raw bytes consumed, including the line terminator when present.
    pub raw_len: u64,
}

/// Read the next line after `cursor`, or `None` when no new bytes exist.
///
/// A missing or unreadable file maps to [`Error::FileUnavailable`] so the
/// caller can leave the cursor untouched and retry next cycle.
pub async fn read_next_line(path: &Path, cursor: u64) -> Result<Option<TailedLine>> {
    let file = File::open(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => Error::FileUnavailable {
            path: path.to_path_buf(),
        },
        _ => Error::Io(e),
    })?;

    let mut reader = BufReader::new(file);
    reader.seek(std::io::SeekFrom::Start(cursor)).await?;

    let mut raw = Vec::new();
    reader.read_until(b'\n', &mut raw).await?;

    if raw.is_empty() {
        return Ok(None);
    }

    Ok(Some(TailedLine {
        raw_len: raw.len() as u64,
        text: decode_line(&raw),
    }))
}

/// Decode raw line bytes, replacing undecodable sequences with U+FFFD and
/// trimming trailing whitespace (including the terminator).
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end().to_string()
}
