//! The extraction cycle: tail each persisted stream by one line and persist
//! at most one record.
//!
//! One line per stream per cycle is intentional throttling; under backlog it
//! trades ingestion latency for bounded iteration cost and a responsive
//! cancellation check. The cursor advances by the raw byte length of the
//! consumed slice whether or not the line matched, so malformed lines are
//! consumed once and never retried.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::patterns::PatternSet;
use crate::store::{to_millis, NewRecord, Store, StreamRow};
use crate::tailer;
use std::path::Path;
use tracing::{error, info, warn};

/// Run one extraction pass over every persisted stream.
///
/// Per-stream failures are contained and logged; only storage errors
/// propagate to the caller.
pub async fn run_extraction_cycle(store: &Store, config: &Config) -> Result<()> {
    let streams = store.list_streams().await?;

    for stream in streams {
        match extract_one(store, config, &stream).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(Error::FileUnavailable { path }) => {
                warn!(stream = %stream.stream_id, path = %path.display(), "Backing file unavailable, will retry next cycle");
            }
            Err(e) => {
                error!(stream = %stream.stream_id, error = %e, "Extraction failed for stream, cursor unchanged");
            }
        }
    }

    Ok(())
}

/// Tail one stream by at most one line.
async fn extract_one(store: &Store, config: &Config, stream: &StreamRow) -> Result<()> {
    let path = Path::new(&stream.file_path);

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| Error::FileUnavailable {
            path: path.to_path_buf(),
        })?;

    let cursor = stream.cursor_position as u64;
    if cursor >= metadata.len() {
        return Ok(());
    }

    let Some(line) = tailer::read_next_line(path, cursor).await? else {
        return Ok(());
    };
    let new_cursor = cursor + line.raw_len;

    info!(
        stream = %stream.stream_id,
        cursor,
        size = metadata.len(),
        line = %line.text,
        "Read line"
    );

    let matched = pattern_set_for(config, stream).match_line(&line.text);
    if matched.is_none() {
        warn!(
            stream = %stream.stream_id,
            position = new_cursor,
            line = %line.text,
            "No pattern matched, line dropped"
        );
    }

    // Cursor advancement and record creation commit together; the cursor
    // moves unconditionally once a line has been read.
    let mut tx = store.begin().await?;
    store
        .advance_cursor(&mut tx, &stream.stream_id, new_cursor as i64)
        .await?;

    if let Some(line_match) = matched {
        let record = NewRecord {
            stream_id: stream.stream_id.clone(),
            pattern_name: line_match.pattern_name,
            record_timestamp: to_millis(line_match.timestamp),
            fields: serde_json::to_string(&line_match.fields)?,
        };
        store.insert_record(&mut tx, &record).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Compile the stream's stored pattern set, falling back to the provider's
/// set when the stored one is empty or unreadable.
fn pattern_set_for(config: &Config, stream: &StreamRow) -> PatternSet {
    match stream.pattern_defs() {
        Ok(defs) if !defs.is_empty() => PatternSet::compile(&defs),
        Ok(_) => PatternSet::compile(config.patterns_for(&stream.stream_id)),
        Err(e) => {
            warn!(stream = %stream.stream_id, error = %e, "Stored patterns unreadable, using provider set");
            PatternSet::compile(config.patterns_for(&stream.stream_id))
        }
    }
}
