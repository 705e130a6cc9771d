//! SQLite-backed event store.
//!
//! All statements run on the dedicated thread owned by `tokio_rusqlite`, so
//! callers are parked rather than blocked while SQLite works. Moves between
//! the queue and dead-letter tables run inside a single transaction.

use std::{
    fmt::{Debug, Formatter},
    path::Path,
};

use async_trait::async_trait;
use rusqlite::{OptionalExtension, Row, params};
use tokio_rusqlite::Connection;
use tracing::info;

use crate::{
    EventStore, StoreError, migrations,
    types::{DeadLetterId, DeadLetterItem, ItemId, NewEvent, QueueItem},
};

const QUEUE_COLUMNS: &str =
    "id, destination, event_name, payload, attempts, next_attempt_at, created_at";
const DEADLETTER_COLUMNS: &str =
    "id, destination, event_name, payload, failure_message, failed_at";
const LAST_PROCESSED_KEY: &str = "last_processed";

/// SQLite stores integers as signed 64-bit values.
fn to_sql(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_sql_len(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn queue_row(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    Ok(QueueItem {
        id: row.get(0)?,
        destination: row.get(1)?,
        event_name: row.get(2)?,
        payload: row.get(3)?,
        attempts: row.get(4)?,
        next_attempt_at: from_sql(row.get(5)?),
        created_at: from_sql(row.get(6)?),
    })
}

fn deadletter_row(row: &Row<'_>) -> rusqlite::Result<DeadLetterItem> {
    Ok(DeadLetterItem {
        id: row.get(0)?,
        destination: row.get(1)?,
        event_name: row.get(2)?,
        payload: row.get(3)?,
        failure_message: row.get(4)?,
        failed_at: from_sql(row.get(5)?),
    })
}

fn count_rows(conn: &rusqlite::Connection, table: &str) -> rusqlite::Result<usize> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?;
    Ok(usize::try_from(count).unwrap_or(0))
}

#[derive(Clone)]
pub struct SqliteEventStore {
    conn: Connection,
    path: String,
}

impl Debug for SqliteEventStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEventStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteEventStore {
    /// Open (creating if needed) the database at `path` and apply pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::prepare(conn, path.display().to_string()).await
    }

    /// A private database that disappears with the store.
    pub async fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::prepare(conn, ":memory:".to_string()).await
    }

    async fn prepare(conn: Connection, path: String) -> crate::Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            migrations::run_migrations(conn)?;
            Ok(())
        })
        .await?;

        info!(path = %path, "Event store opened");

        Ok(Self { conn, path })
    }

    async fn call<F, T>(&self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        Ok(self.conn.call(move |conn| Ok(f(conn)?)).await?)
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn insert(&self, event: NewEvent) -> crate::Result<ItemId> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO queue (destination, event_name, payload, attempts, next_attempt_at, created_at)
                 VALUES (?1, ?2, ?3, 0, 0, ?4)",
                params![
                    event.destination,
                    event.event_name,
                    event.payload,
                    to_sql(event.created_at)
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn select_ready(&self, now: u64, limit: usize) -> crate::Result<Vec<QueueItem>> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM queue
             WHERE next_attempt_at = 0 OR next_attempt_at <= ?1
             ORDER BY created_at ASC, id ASC
             LIMIT ?2"
        );

        self.call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(params![to_sql(now), to_sql_len(limit)], queue_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(items)
        })
        .await
    }

    async fn get(&self, id: ItemId) -> crate::Result<Option<QueueItem>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM queue WHERE id = ?1");
        self.call(move |conn| conn.query_row(&sql, params![id], queue_row).optional())
            .await
    }

    async fn delete(&self, id: ItemId) -> crate::Result<bool> {
        self.call(move |conn| {
            Ok(conn.execute("DELETE FROM queue WHERE id = ?1", params![id])? > 0)
        })
        .await
    }

    async fn update_retry(
        &self,
        id: ItemId,
        attempts: u32,
        next_attempt_at: u64,
    ) -> crate::Result<bool> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE queue SET attempts = ?2, next_attempt_at = ?3 WHERE id = ?1",
                params![id, attempts, to_sql(next_attempt_at)],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn move_to_deadletter(
        &self,
        item: &QueueItem,
        failure_message: &str,
        now: u64,
    ) -> crate::Result<Option<DeadLetterId>> {
        let item = item.clone();
        let failure_message = failure_message.to_string();

        self.call(move |conn| {
            let tx = conn.transaction()?;
            if tx.execute("DELETE FROM queue WHERE id = ?1", params![item.id])? == 0 {
                return Ok(None);
            }

            tx.execute(
                "INSERT INTO deadletter (destination, event_name, payload, failure_message, failed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    item.destination,
                    item.event_name,
                    item.payload,
                    failure_message,
                    to_sql(now)
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;

            Ok(Some(id))
        })
        .await
    }

    async fn count(&self) -> crate::Result<usize> {
        self.call(|conn| count_rows(conn, "queue")).await
    }

    async fn list(&self, limit: usize, offset: usize) -> crate::Result<Vec<QueueItem>> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM queue
             ORDER BY created_at DESC, id DESC
             LIMIT ?1 OFFSET ?2"
        );

        self.call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(params![to_sql_len(limit), to_sql_len(offset)], queue_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(items)
        })
        .await
    }

    async fn count_deadletter(&self) -> crate::Result<usize> {
        self.call(|conn| count_rows(conn, "deadletter")).await
    }

    async fn list_deadletter(
        &self,
        limit: usize,
        offset: usize,
    ) -> crate::Result<Vec<DeadLetterItem>> {
        let sql = format!(
            "SELECT {DEADLETTER_COLUMNS} FROM deadletter
             ORDER BY failed_at DESC, id DESC
             LIMIT ?1 OFFSET ?2"
        );

        self.call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(params![to_sql_len(limit), to_sql_len(offset)], deadletter_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(items)
        })
        .await
    }

    async fn get_deadletter(&self, id: DeadLetterId) -> crate::Result<Option<DeadLetterItem>> {
        let sql = format!("SELECT {DEADLETTER_COLUMNS} FROM deadletter WHERE id = ?1");
        self.call(move |conn| conn.query_row(&sql, params![id], deadletter_row).optional())
            .await
    }

    async fn retry_deadletter(&self, id: DeadLetterId, now: u64) -> crate::Result<Option<ItemId>> {
        let sql = format!("SELECT {DEADLETTER_COLUMNS} FROM deadletter WHERE id = ?1");

        self.call(move |conn| {
            let tx = conn.transaction()?;
            let Some(dead) = tx.query_row(&sql, params![id], deadletter_row).optional()? else {
                return Ok(None);
            };

            tx.execute(
                "INSERT INTO queue (destination, event_name, payload, attempts, next_attempt_at, created_at)
                 VALUES (?1, ?2, ?3, 0, 0, ?4)",
                params![dead.destination, dead.event_name, dead.payload, to_sql(now)],
            )?;
            let item_id = tx.last_insert_rowid();
            tx.execute("DELETE FROM deadletter WHERE id = ?1", params![id])?;
            tx.commit()?;

            Ok(Some(item_id))
        })
        .await
    }

    async fn delete_deadletter(&self, id: DeadLetterId) -> crate::Result<bool> {
        self.call(move |conn| {
            Ok(conn.execute("DELETE FROM deadletter WHERE id = ?1", params![id])? > 0)
        })
        .await
    }

    async fn last_processed(&self) -> crate::Result<Option<u64>> {
        self.call(|conn| {
            let value: Option<i64> = conn
                .query_row(
                    "SELECT value FROM state WHERE key = ?1",
                    params![LAST_PROCESSED_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.map(from_sql))
        })
        .await
    }

    async fn set_last_processed(&self, at: u64) -> crate::Result<()> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO state (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![LAST_PROCESSED_KEY, to_sql(at)],
            )?;
            Ok(())
        })
        .await
    }
}
