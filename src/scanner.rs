//! Directory scanning and stream discovery.
//!
//! Log files follow the naming convention `DD-MM-YY_HH-MM-SS_<streamId>.txt`
//! where the leading timestamp is the stream's creation time. The external
//! process starts a fresh file per stream per session, so several files can
//! classify to the same stream id; the one with the latest embedded creation
//! time is authoritative.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{error, warn};

/// Timestamp format embedded in log file names, e.g. `01-01-24_10-00-00`.
pub const FILE_TIMESTAMP_FORMAT: &str = "%d-%m-%y_%H-%M-%S";

static FILE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2})_(.+)\.txt$").expect("valid literal regex")
});

/// Filesystem observation of one stream's authoritative backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSnapshot {
    pub stream_id: String,
    pub file_name: String,
    pub file_path: PathBuf,
    /// Creation time embedded in the file name.
    pub created_at: DateTime<Utc>,
    /// Filesystem modification time.
    pub last_modified: DateTime<Utc>,
    /// Filesystem creation time, falling back to mtime where unsupported.
    pub creation_time: DateTime<Utc>,
    pub file_size: u64,
}

/// Split a conventional file name into its embedded creation time and stream id.
///
/// Returns `None` for files that do not follow the convention; those are
/// ignored silently by the scan.
fn classify_file_name(file_name: &str) -> Option<(DateTime<Utc>, String)> {
    let captures = FILE_NAME_RE.captures(file_name)?;
    let created_at = NaiveDateTime::parse_from_str(&captures[1], FILE_TIMESTAMP_FORMAT)
        .ok()?
        .and_utc();
    Some((created_at, captures[2].to_string()))
}

/// List `dir` and build one snapshot per stream id, newest file wins.
///
/// An unavailable directory is [`Error::DirectoryUnavailable`]; the caller
/// must not reconcile against the missing observations, or every persisted
/// stream would look vanished.
pub async fn scan_directory(dir: &Path) -> Result<HashMap<String, StreamSnapshot>> {
    let mut snapshots: HashMap<String, StreamSnapshot> = HashMap::new();

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|_| Error::DirectoryUnavailable {
            path: dir.to_path_buf(),
        })?;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "Directory listing aborted");
                break;
            }
        };

        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some((created_at, stream_id)) = classify_file_name(&file_name) else {
            continue;
        };

        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                warn!(file = %file_name, error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(created_at);
        let creation_time = metadata
            .created()
            .map(DateTime::<Utc>::from)
            .unwrap_or(last_modified);

        let snapshot = StreamSnapshot {
            stream_id: stream_id.clone(),
            file_name,
            file_path: entry.path(),
            created_at,
            last_modified,
            creation_time,
            file_size: metadata.len(),
        };

        match snapshots.get(&stream_id) {
            Some(existing) if existing.created_at >= snapshot.created_at => {}
            _ => {
                snapshots.insert(stream_id, snapshot);
            }
        }
    }

    Ok(snapshots)
}
