//! SQLite persistence for streams and extracted records.
//!
//! All state flows through this layer: the stream catalog (with its resumable
//! byte cursors) and the extracted records. Timestamps are stored as INTEGER
//! milliseconds since the Unix epoch. Mutations run inside explicit
//! per-phase transactions begun by the caller; dropping an uncommitted
//! transaction rolls it back, which is the release path on cancellation and
//! fatal errors.

use crate::config::PatternDef;
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Sqlite;
use std::path::Path;
use tracing::info;

/// A transaction over the harvester database.
pub type StoreTx = sqlx::Transaction<'static, Sqlite>;

/// Schema, created on open.
///
/// `records.stream_id` is intentionally not a foreign key: records outlive
/// the deletion of their stream when its backing file rotates away.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS streams (
    stream_id TEXT PRIMARY KEY,
    file_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    last_modified INTEGER NOT NULL,
    creation_time INTEGER NOT NULL,
    file_size INTEGER NOT NULL,
    cursor_position INTEGER NOT NULL DEFAULT 0,
    patterns TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stream_id TEXT NOT NULL,
    pattern_name TEXT NOT NULL,
    record_timestamp INTEGER NOT NULL,
    fields TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_stream ON records(stream_id);
CREATE INDEX IF NOT EXISTS idx_records_created_at ON records(created_at);
"#;

/// Persisted catalog entry for one log stream.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StreamRow {
    pub stream_id: String,
    pub file_name: String,
    pub file_path: String,
    /// Creation time embedded in the file name (epoch ms).
    pub created_at: i64,
    /// Filesystem mtime (epoch ms).
    pub last_modified: i64,
    /// Filesystem creation time (epoch ms).
    pub creation_time: i64,
    pub file_size: i64,
    /// Bytes already consumed from the backing file.
    pub cursor_position: i64,
    /// Ordered pattern set as a JSON array of `{name, regex}` objects.
    pub patterns: String,
}

impl StreamRow {
    /// Deserialize the stored pattern set, preserving order.
    pub fn pattern_defs(&self) -> Result<Vec<PatternDef>> {
        Ok(serde_json::from_str(&self.patterns)?)
    }
}

/// Persisted record extracted from one matched line.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecordRow {
    pub id: i64,
    pub stream_id: String,
    pub pattern_name: String,
    /// Timestamp parsed from the line (epoch ms).
    pub record_timestamp: i64,
    /// Flat map of named captures as a JSON object.
    pub fields: String,
    /// Ingestion time (epoch ms).
    pub created_at: i64,
}

/// Record contents prior to insertion.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub stream_id: String,
    pub pattern_name: String,
    pub record_timestamp: i64,
    pub fields: String,
}

/// Storage provider wrapping a long-lived SQLite pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

/// Current wall-clock time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Epoch milliseconds of a datetime.
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

impl Store {
    /// Open or create a database at the given path and ensure the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;

        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    ///
    /// A single connection keeps every query on the same memory database.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// The underlying connection pool (escape hatch for ad-hoc queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction for one phase of the cycle.
    pub async fn begin(&self) -> Result<StoreTx> {
        Ok(self.pool.begin().await?)
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }

    // ========================================================================
    // Stream catalog
    // ========================================================================

    /// All persisted streams, ordered by id for deterministic iteration.
    pub async fn list_streams(&self) -> Result<Vec<StreamRow>> {
        let rows = sqlx::query_as::<_, StreamRow>(
            "SELECT stream_id, file_name, file_path, created_at, last_modified, creation_time, \
             file_size, cursor_position, patterns FROM streams ORDER BY stream_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Fetch one stream by id.
    pub async fn get_stream(&self, stream_id: &str) -> Result<Option<StreamRow>> {
        let row = sqlx::query_as::<_, StreamRow>(
            "SELECT stream_id, file_name, file_path, created_at, last_modified, creation_time, \
             file_size, cursor_position, patterns FROM streams WHERE stream_id = ?",
        )
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Insert a newly discovered stream. The cursor starts at zero.
    pub async fn insert_stream(&self, tx: &mut StoreTx, stream: &StreamRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO streams (stream_id, file_name, file_path, created_at, last_modified, \
             creation_time, file_size, cursor_position, patterns) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&stream.stream_id)
        .bind(&stream.file_name)
        .bind(&stream.file_path)
        .bind(stream.created_at)
        .bind(stream.last_modified)
        .bind(stream.creation_time)
        .bind(stream.file_size)
        .bind(stream.cursor_position)
        .bind(&stream.patterns)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Overwrite a stream's filesystem metadata, leaving the cursor alone.
    pub async fn update_stream_metadata(&self, tx: &mut StoreTx, stream: &StreamRow) -> Result<()> {
        sqlx::query(
            "UPDATE streams SET file_name = ?, file_path = ?, created_at = ?, last_modified = ?, \
             creation_time = ?, file_size = ? WHERE stream_id = ?",
        )
        .bind(&stream.file_name)
        .bind(&stream.file_path)
        .bind(stream.created_at)
        .bind(stream.last_modified)
        .bind(stream.creation_time)
        .bind(stream.file_size)
        .bind(&stream.stream_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Replace a stream's stored pattern set.
    pub async fn update_stream_patterns(
        &self,
        tx: &mut StoreTx,
        stream_id: &str,
        patterns: &[PatternDef],
    ) -> Result<()> {
        let json = serde_json::to_string(patterns)?;

        sqlx::query("UPDATE streams SET patterns = ? WHERE stream_id = ?")
            .bind(json)
            .bind(stream_id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Remove a stream from the catalog. Its records are left in place.
    pub async fn delete_stream(&self, tx: &mut StoreTx, stream_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM streams WHERE stream_id = ?")
            .bind(stream_id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Advance a stream's byte cursor.
    pub async fn advance_cursor(
        &self,
        tx: &mut StoreTx,
        stream_id: &str,
        cursor_position: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE streams SET cursor_position = ? WHERE stream_id = ?")
            .bind(cursor_position)
            .bind(stream_id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Insert one extracted record with the current ingestion time.
    pub async fn insert_record(&self, tx: &mut StoreTx, record: &NewRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO records (stream_id, pattern_name, record_timestamp, fields, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.stream_id)
        .bind(&record.pattern_name)
        .bind(record.record_timestamp)
        .bind(&record.fields)
        .bind(now_millis())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// All records for one stream, oldest first.
    pub async fn list_records(&self, stream_id: &str) -> Result<Vec<RecordRow>> {
        let rows = sqlx::query_as::<_, RecordRow>(
            "SELECT id, stream_id, pattern_name, record_timestamp, fields, created_at \
             FROM records WHERE stream_id = ? ORDER BY id",
        )
        .bind(stream_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Total number of persisted records.
    pub async fn count_records(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Delete records strictly older than the cutoff, returning the count.
    ///
    /// A single statement, so it is atomic without an explicit transaction.
    pub async fn delete_records_older_than(&self, cutoff_millis: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM records WHERE created_at < ?")
            .bind(cutoff_millis)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stream(stream_id: &str) -> StreamRow {
        StreamRow {
            stream_id: stream_id.to_string(),
            file_name: format!("01-01-24_10-00-00_{stream_id}.txt"),
            file_path: format!("/logs/01-01-24_10-00-00_{stream_id}.txt"),
            created_at: 1_704_103_200_000,
            last_modified: 1_704_103_260_000,
            creation_time: 1_704_103_200_000,
            file_size: 128,
            cursor_position: 0,
            patterns: "[]".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_stream() {
        let store = Store::open_in_memory().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        store.insert_stream(&mut tx, &sample_stream("chat")).await.unwrap();
        tx.commit().await.unwrap();

        let row = store.get_stream("chat").await.unwrap().unwrap();
        assert_eq!(row.file_size, 128);
        assert_eq!(row.cursor_position, 0);
        assert!(row.pattern_defs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_rolls_back_on_drop() {
        let store = Store::open_in_memory().await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            store.insert_stream(&mut tx, &sample_stream("chat")).await.unwrap();
            // tx dropped without commit
        }

        assert!(store.get_stream("chat").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_metadata_preserves_cursor() {
        let store = Store::open_in_memory().await.unwrap();

        let mut stream = sample_stream("chat");
        let mut tx = store.begin().await.unwrap();
        store.insert_stream(&mut tx, &stream).await.unwrap();
        store.advance_cursor(&mut tx, "chat", 64).await.unwrap();
        tx.commit().await.unwrap();

        stream.file_size = 256;
        stream.last_modified += 5_000;
        let mut tx = store.begin().await.unwrap();
        store.update_stream_metadata(&mut tx, &stream).await.unwrap();
        tx.commit().await.unwrap();

        let row = store.get_stream("chat").await.unwrap().unwrap();
        assert_eq!(row.file_size, 256);
        assert_eq!(row.cursor_position, 64);
    }

    #[tokio::test]
    async fn test_pattern_round_trip_preserves_order() {
        let store = Store::open_in_memory().await.unwrap();

        let defs = vec![
            PatternDef {
                name: "first".to_string(),
                regex: "^a(1)$".to_string(),
            },
            PatternDef {
                name: "second".to_string(),
                regex: "^b(2)$".to_string(),
            },
        ];

        let mut tx = store.begin().await.unwrap();
        store.insert_stream(&mut tx, &sample_stream("chat")).await.unwrap();
        store.update_stream_patterns(&mut tx, "chat", &defs).await.unwrap();
        tx.commit().await.unwrap();

        let row = store.get_stream("chat").await.unwrap().unwrap();
        assert_eq!(row.pattern_defs().unwrap(), defs);
    }

    #[tokio::test]
    async fn test_delete_stream_keeps_records() {
        let store = Store::open_in_memory().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        store.insert_stream(&mut tx, &sample_stream("chat")).await.unwrap();
        store
            .insert_record(
                &mut tx,
                &NewRecord {
                    stream_id: "chat".to_string(),
                    pattern_name: "chat".to_string(),
                    record_timestamp: 1_704_103_201_123,
                    fields: r#"{"msg":"hello"}"#.to_string(),
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        store.delete_stream(&mut tx, "chat").await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.get_stream("chat").await.unwrap().is_none());
        let records = store.list_records("chat").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pattern_name, "chat");
    }

    #[tokio::test]
    async fn test_retention_cutoff_is_strict() {
        let store = Store::open_in_memory().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        store.insert_stream(&mut tx, &sample_stream("chat")).await.unwrap();
        for i in 0..3 {
            store
                .insert_record(
                    &mut tx,
                    &NewRecord {
                        stream_id: "chat".to_string(),
                        pattern_name: "chat".to_string(),
                        record_timestamp: 1_704_103_201_123 + i,
                        fields: "{}".to_string(),
                    },
                )
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();

        // All records were created "now": an old cutoff deletes nothing, a
        // future cutoff deletes everything.
        let deleted = store
            .delete_records_older_than(now_millis() - 60_000)
            .await
            .unwrap();
        assert_eq!(deleted, 0);

        let deleted = store
            .delete_records_older_than(now_millis() + 60_000)
            .await
            .unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(store.count_records().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_streams_ordered_by_id() {
        let store = Store::open_in_memory().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        store.insert_stream(&mut tx, &sample_stream("server")).await.unwrap();
        store.insert_stream(&mut tx, &sample_stream("chat")).await.unwrap();
        tx.commit().await.unwrap();

        let streams = store.list_streams().await.unwrap();
        let ids: Vec<&str> = streams.iter().map(|s| s.stream_id.as_str()).collect();
        assert_eq!(ids, vec!["chat", "server"]);
    }
}
