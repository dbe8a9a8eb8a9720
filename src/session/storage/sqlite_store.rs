//! SQLite-backed conversation store keyed by title.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use tracing::warn;

use crate::session::core::errors::{ChatError, ChatResult};
use crate::session::core::message::Conversation;

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persistent title → conversation records.
pub trait ConversationStore: Send + Sync {
    /// Insert or replace the record under `title`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn put(&self, title: String, record: Conversation) -> StoreFuture<'_, ChatResult<()>>;

    /// Remove the record under `title`; absent keys are not an error.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn remove(&self, title: String) -> StoreFuture<'_, ChatResult<()>>;

    /// Move the record under `old` to `new` in one transaction.
    ///
    /// # Errors
    /// Returns [`ChatError::Conflict`] if `new` is taken, [`ChatError::NotFound`] if `old`
    /// is absent, or a persistence error; no change is applied in any error case.
    fn rename(&self, old: String, new: String) -> StoreFuture<'_, ChatResult<()>>;

    /// All records, most recent first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_by_time(&self) -> StoreFuture<'_, ChatResult<Vec<(String, Conversation)>>>;
}

enum RenameOutcome {
    Renamed,
    Missing,
    Taken,
}

/// `SQLite` implementation of the conversation store.
pub struct SqliteConversationStore {
    conn: Arc<Connection>,
    table: String,
}

impl SqliteConversationStore {
    /// Table name for conversations.
    pub const DEFAULT_TABLE: &'static str = "conversations";

    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open(path: &Path) -> ChatResult<Self> {
        let conn = Connection::open(path).await?;
        Self::new(Arc::new(conn)).await
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created.
    pub async fn open_in_memory() -> ChatResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::new(Arc::new(conn)).await
    }

    /// Initialize the store on a connection and create the table if needed.
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn new(conn: Arc<Connection>) -> ChatResult<Self> {
        let table = Self::DEFAULT_TABLE.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    title TEXT PRIMARY KEY,
                    time INTEGER NOT NULL,
                    record TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table_name}_time
                    ON {table_name} (time DESC);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl ConversationStore for SqliteConversationStore {
    fn put(&self, title: String, record: Conversation) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            let time = record.created_at;
            let body = serde_json::to_string(&record)?;

            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT OR REPLACE INTO {table} (title, time, record) VALUES (?1, ?2, ?3)"
                        ),
                        rusqlite::params![title, time, body],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn remove(&self, title: String) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!("DELETE FROM {table} WHERE title = ?1"),
                        rusqlite::params![title],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn rename(&self, old: String, new: String) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            let (old_title, new_title) = (old.clone(), new.clone());

            let outcome = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let existing = tx
                        .query_row(
                            &format!("SELECT time, record FROM {table} WHERE title = ?1"),
                            rusqlite::params![old_title],
                            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                        )
                        .optional()?;
                    let Some((time, record)) = existing else {
                        return Ok(RenameOutcome::Missing);
                    };
                    if old_title == new_title {
                        return Ok(RenameOutcome::Renamed);
                    }

                    let taken = tx
                        .query_row(
                            &format!("SELECT 1 FROM {table} WHERE title = ?1"),
                            rusqlite::params![new_title],
                            |_| Ok(()),
                        )
                        .optional()?
                        .is_some();
                    if taken {
                        return Ok(RenameOutcome::Taken);
                    }

                    tx.execute(
                        &format!("INSERT INTO {table} (title, time, record) VALUES (?1, ?2, ?3)"),
                        rusqlite::params![new_title, time, record],
                    )?;
                    tx.execute(
                        &format!("DELETE FROM {table} WHERE title = ?1"),
                        rusqlite::params![old_title],
                    )?;
                    tx.commit()?;
                    Ok(RenameOutcome::Renamed)
                })
                .await?;

            match outcome {
                RenameOutcome::Renamed => Ok(()),
                RenameOutcome::Missing => Err(ChatError::NotFound(old)),
                RenameOutcome::Taken => Err(ChatError::Conflict(new)),
            }
        })
    }

    fn list_by_time(&self) -> StoreFuture<'_, ChatResult<Vec<(String, Conversation)>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT title, record FROM {table} ORDER BY time DESC, title ASC"
                    ))?;
                    let rows = stmt
                        .query_map([], |row| {
                            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            let mut records = Vec::with_capacity(rows.len());
            for (title, body) in rows {
                match serde_json::from_str::<Conversation>(&body) {
                    Ok(record) => records.push((title, record)),
                    Err(err) => warn!("Skipping unreadable record {title:?}: {err}"),
                }
            }
            Ok(records)
        })
    }
}
