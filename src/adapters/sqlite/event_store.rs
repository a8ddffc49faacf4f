//! SQLite implementation of the event store port.
//!
//! Two append-only tables plus a key/value side table. The `events` rowid
//! is the monotonic index the rest of the system orders by; assignment
//! happens inside the INSERT, which makes the append the linearization
//! point. Timestamps are stored as RFC 3339 UTC strings and revived into
//! date-typed values on read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::Path;

use crate::adapters::sqlite::{
    all_embedded_migrations, create_pool, ConnectionError, MigrationError, Migrator,
};
use crate::domain::models::{Event, EventPayload, SessionState, StoredEvent};
use crate::domain::ports::{EventStore, EventStoreError, Snapshot};

/// SQLite-backed event store.
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database file, apply migrations, and return the store.
    pub async fn open(db_path: &Path) -> Result<Self, OpenError> {
        let url = format!("sqlite://{}", db_path.display());
        let pool = create_pool(&url, None).await?;
        Migrator::new(pool.clone())
            .run_embedded_migrations(all_embedded_migrations())
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_event(row: EventRow) -> Result<StoredEvent, EventStoreError> {
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map_err(|e| EventStoreError::Corrupt(format!("invalid timestamp: {e}")))?
            .with_timezone(&Utc);
        let payload: EventPayload = serde_json::from_str(&row.payload)
            .map_err(|e| EventStoreError::Corrupt(format!("invalid payload: {e}")))?;

        Ok(StoredEvent {
            index: row.id,
            event: Event::new(timestamp, payload),
        })
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append_event(&self, event: &Event) -> Result<i64, EventStoreError> {
        let payload_json = serde_json::to_string(&event.payload)
            .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO events (kind, payload, timestamp, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(event.kind())
        .bind(payload_json)
        .bind(event.timestamp.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| EventStoreError::AppendError(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    async fn get_events(
        &self,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut sql =
            String::from("SELECT id, kind, payload, timestamp FROM events WHERE 1=1");
        if let Some(from) = from {
            sql.push_str(&format!(" AND id >= {from}"));
        }
        if let Some(to) = to {
            sql.push_str(&format!(" AND id <= {to}"));
        }
        sql.push_str(" ORDER BY id ASC");

        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EventStoreError::QueryError(e.to_string()))?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn create_snapshot(
        &self,
        state: &SessionState,
        at_event_index: i64,
    ) -> Result<(), EventStoreError> {
        let state_json = serde_json::to_string(state)
            .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;

        sqlx::query("INSERT INTO snapshots (at_event_index, state, created_at) VALUES (?, ?, ?)")
            .bind(at_event_index)
            .bind(state_json)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| EventStoreError::SnapshotError(e.to_string()))?;

        Ok(())
    }

    async fn latest_snapshot(&self) -> Result<Option<Snapshot>, EventStoreError> {
        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT at_event_index, state FROM snapshots ORDER BY at_event_index DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EventStoreError::QueryError(e.to_string()))?;

        let Some((at_event_index, state_json)) = row else {
            return Ok(None);
        };
        let state: SessionState = serde_json::from_str(&state_json)
            .map_err(|e| EventStoreError::Corrupt(format!("invalid snapshot state: {e}")))?;

        Ok(Some(Snapshot {
            state,
            at_event_index,
        }))
    }

    async fn count(&self) -> Result<u64, EventStoreError> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EventStoreError::QueryError(e.to_string()))?;
        Ok(result.0 as u64)
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, EventStoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EventStoreError::QueryError(e.to_string()))?;
        Ok(row.map(|(v,)| v))
    }

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), EventStoreError> {
        sqlx::query(
            "INSERT INTO metadata (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| EventStoreError::AppendError(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    #[allow(dead_code)]
    kind: String,
    payload: String,
    timestamp: String,
}
