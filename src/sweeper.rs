//! Age-based eviction of old records.

use crate::error::Result;
use crate::store::{now_millis, Store};
use std::time::Duration;
use tracing::{debug, info};

/// Delete records strictly older than the retention window.
///
/// A disabled window (`None`) is a no-op; zero deletions is not an error.
/// Returns the number of deleted records.
pub async fn sweep(store: &Store, window: Option<Duration>) -> Result<u64> {
    let Some(window) = window else {
        return Ok(0);
    };

    let cutoff = now_millis() - window.as_millis() as i64;
    let deleted = store.delete_records_older_than(cutoff).await?;

    if deleted > 0 {
        info!(deleted, "Old records cleaned from the database");
    } else {
        debug!("No old records found to delete");
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewRecord, StreamRow};

    async fn seed(store: &Store, ages_ms: &[i64]) {
        let mut tx = store.begin().await.unwrap();
        store
            .insert_stream(
                &mut tx,
                &StreamRow {
                    stream_id: "chat".to_string(),
                    file_name: "01-01-24_10-00-00_chat.txt".to_string(),
                    file_path: "/logs/01-01-24_10-00-00_chat.txt".to_string(),
                    created_at: 0,
                    last_modified: 0,
                    creation_time: 0,
                    file_size: 0,
                    cursor_position: 0,
                    patterns: "[]".to_string(),
                },
            )
            .await
            .unwrap();
        for _ in ages_ms {
            store
                .insert_record(
                    &mut tx,
                    &NewRecord {
                        stream_id: "chat".to_string(),
                        pattern_name: "chat".to_string(),
                        record_timestamp: 0,
                        fields: "{}".to_string(),
                    },
                )
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();

        // Backdate the ingestion timestamps to the requested ages.
        for (i, age) in ages_ms.iter().enumerate() {
            sqlx::query("UPDATE records SET created_at = ? WHERE id = ?")
                .bind(now_millis() - age)
                .bind((i + 1) as i64)
                .execute(store.pool())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_disabled_retention_is_a_no_op() {
        let store = Store::open_in_memory().await.unwrap();
        seed(&store, &[60_000, 120_000]).await;

        let deleted = sweep(&store, None).await.unwrap();

        assert_eq!(deleted, 0);
        assert_eq!(store.count_records().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_records_beyond_window() {
        let store = Store::open_in_memory().await.unwrap();
        // Two well past a 10 s window, one comfortably inside it.
        seed(&store, &[60_000, 30_000, 1_000]).await;

        let deleted = sweep(&store, Some(Duration::from_secs(10))).await.unwrap();

        assert_eq!(deleted, 2);
        let remaining = store.list_records("chat").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, 3);
    }

    #[tokio::test]
    async fn test_sweep_with_nothing_to_delete_returns_zero() {
        let store = Store::open_in_memory().await.unwrap();
        seed(&store, &[1_000]).await;

        let deleted = sweep(&store, Some(Duration::from_secs(60))).await.unwrap();

        assert_eq!(deleted, 0);
        assert_eq!(store.count_records().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_on_empty_database() {
        let store = Store::open_in_memory().await.unwrap();

        let deleted = sweep(&store, Some(Duration::from_secs(10))).await.unwrap();

        assert_eq!(deleted, 0);
    }
}
