//! Reconciliation between scanned filesystem state and the persisted catalog.
//!
//! Runs as one transaction per cycle. Step order matters: vanished streams
//! are dropped first, empty pattern sets are restored, then scanned
//! candidates are inserted or updated. The byte cursor is never touched
//! here; only the extraction cycle advances it.

use crate::config::Config;
use crate::error::Result;
use crate::scanner::StreamSnapshot;
use crate::store::{to_millis, Store, StreamRow};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Clock and filesystem timestamp jitter absorbed when comparing metadata.
const TIMESTAMP_TOLERANCE_MS: i64 = 1_000;

/// Bring the persisted catalog into agreement with the scanned snapshots.
///
/// Commits all changes atomically; on failure the whole reconciliation rolls
/// back and the caller proceeds to the next cycle.
pub async fn reconcile(
    store: &Store,
    config: &Config,
    snapshots: &HashMap<String, StreamSnapshot>,
) -> Result<()> {
    let persisted = store.list_streams().await?;
    let mut tx = store.begin().await?;

    // Streams whose backing file vanished leave the catalog. Their records
    // stay behind as history.
    let mut remaining = Vec::with_capacity(persisted.len());
    for stream in persisted {
        if Path::new(&stream.file_path).exists() {
            remaining.push(stream);
        } else {
            store.delete_stream(&mut tx, &stream.stream_id).await?;
            info!(stream = %stream.stream_id, file = %stream.file_path, "Stream removed, backing file is gone");
        }
    }

    // Restore pattern sets that were stored empty. Unreadable patterns are
    // treated as empty so one corrupt row cannot wedge reconciliation.
    for stream in &remaining {
        let needs_restore = match stream.pattern_defs() {
            Ok(defs) => defs.is_empty(),
            Err(e) => {
                warn!(stream = %stream.stream_id, error = %e, "Stored patterns unreadable, repopulating");
                true
            }
        };
        if needs_restore {
            let defs = config.patterns_for(&stream.stream_id);
            store
                .update_stream_patterns(&mut tx, &stream.stream_id, defs)
                .await?;
            info!(stream = %stream.stream_id, count = defs.len(), "Pattern set restored");
        }
    }

    let by_id: HashMap<&str, &StreamRow> = remaining
        .iter()
        .map(|s| (s.stream_id.as_str(), s))
        .collect();

    for snapshot in snapshots.values() {
        match by_id.get(snapshot.stream_id.as_str()) {
            None => {
                let defs = config.patterns_for(&snapshot.stream_id);
                let row = snapshot_to_row(snapshot, serde_json::to_string(defs)?);
                store.insert_stream(&mut tx, &row).await?;
                info!(stream = %snapshot.stream_id, file = %snapshot.file_name, "New stream added");
            }
            Some(existing) if has_changed(existing, snapshot) => {
                let mut row = snapshot_to_row(snapshot, existing.patterns.clone());
                row.cursor_position = existing.cursor_position;
                store.update_stream_metadata(&mut tx, &row).await?;
                info!(stream = %snapshot.stream_id, file = %snapshot.file_name, "Stream metadata updated");
            }
            Some(_) => {
                debug!(stream = %snapshot.stream_id, "Stream unchanged");
            }
        }
    }

    tx.commit().await?;
    Ok(())
}

fn snapshot_to_row(snapshot: &StreamSnapshot, patterns: String) -> StreamRow {
    StreamRow {
        stream_id: snapshot.stream_id.clone(),
        file_name: snapshot.file_name.clone(),
        file_path: snapshot.file_path.to_string_lossy().to_string(),
        created_at: to_millis(snapshot.created_at),
        last_modified: to_millis(snapshot.last_modified),
        creation_time: to_millis(snapshot.creation_time),
        file_size: snapshot.file_size as i64,
        cursor_position: 0,
        patterns,
    }
}

/// Whether a scanned snapshot differs from the persisted stream.
///
/// Datetime fields tolerate clock and filesystem jitter; names, paths and
/// sizes must match exactly.
fn has_changed(existing: &StreamRow, snapshot: &StreamSnapshot) -> bool {
    existing.file_name != snapshot.file_name
        || existing.file_path != snapshot.file_path.to_string_lossy()
        || existing.file_size != snapshot.file_size as i64
        || beyond_tolerance(existing.created_at, to_millis(snapshot.created_at))
        || beyond_tolerance(existing.last_modified, to_millis(snapshot.last_modified))
        || beyond_tolerance(existing.creation_time, to_millis(snapshot.creation_time))
}

fn beyond_tolerance(a: i64, b: i64) -> bool {
    (a - b).abs() > TIMESTAMP_TOLERANCE_MS
}
