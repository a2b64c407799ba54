//! SQLite History Storage
//!
//! Information Hiding:
//! - Table layout and epoch-millisecond timestamp encoding hidden from users
//! - Blocking rusqlite calls run on the blocking pool behind an async interface
//! - Every call is bounded by the configured store timeout; a call that
//!   overruns is interrupted and its transaction rolled back, so the result
//!   reported to the caller is always the committed outcome

use super::{resolve_title, HistoryStore};
use crate::core::{
    now_millis, ChatSession, HistoryError, HistoryResult, Message, OwnerId, PageRequest, Sender,
    SessionDetail, SessionId, SessionPage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, InterruptHandle, OptionalExtension, Row, TransactionBehavior};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS chat_histories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        last_message_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chat_history_id INTEGER NOT NULL,
        content TEXT NOT NULL,
        sender TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (chat_history_id) REFERENCES chat_histories(id)
    );

    CREATE INDEX IF NOT EXISTS idx_chat_histories_user_last
        ON chat_histories(user_id, last_message_at DESC);
    CREATE INDEX IF NOT EXISTS idx_messages_chat
        ON messages(chat_history_id, created_at);
";

/// SQLite-backed store. One connection guarded by a mutex; SQLite serializes
/// writers anyway and the blocking pool keeps the runtime free.
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
    interrupt: InterruptHandle,
    timeout: Duration,
}

impl SqliteHistoryStore {
    pub async fn open(path: &str, timeout: Duration) -> HistoryResult<Self> {
        let path = path.to_string();
        let conn = tokio::task::spawn_blocking(move || -> HistoryResult<Connection> {
            let conn = if path == ":memory:" {
                Connection::open_in_memory()?
            } else {
                Connection::open(&path)?
            };
            init_schema(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| HistoryError::store(format!("task join error: {}", e)))??;

        tracing::info!("[SqliteHistoryStore] Schema ready");
        Ok(Self::from_connection(conn, timeout))
    }

    pub fn in_memory() -> HistoryResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self::from_connection(conn, Duration::from_secs(5)))
    }

    fn from_connection(conn: Connection, timeout: Duration) -> Self {
        Self {
            interrupt: conn.get_interrupt_handle(),
            conn: Arc::new(Mutex::new(conn)),
            timeout,
        }
    }

    /// Run `op` on the blocking pool, bounded by the store timeout.
    ///
    /// Lock waits inside SQLite are capped by a busy timeout set to what is
    /// left of the deadline. If the deadline still passes, the running
    /// statement is interrupted and the task is awaited anyway, so a
    /// transaction either committed (and `Ok` is returned) or rolled back.
    async fn with_conn<T, F>(&self, label: &'static str, op: F) -> HistoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> HistoryResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let deadline = Instant::now() + self.timeout;
        let mut task = tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| {
                tracing::warn!("[SqliteHistoryStore] Connection mutex was poisoned, recovering");
                poisoned.into_inner()
            });

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(HistoryError::store(format!(
                    "{} timed out waiting for the connection",
                    label
                )));
            }
            guard.busy_timeout(remaining)?;
            op(&mut *guard)
        });

        let joined = match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    "[SqliteHistoryStore] {} overran {:?}, interrupting",
                    label,
                    self.timeout
                );
                self.interrupt.interrupt();
                task.await
            }
        };

        joined.map_err(|e| HistoryError::store(format!("{} join error: {}", label, e)))?
    }
}

fn init_schema(conn: &Connection) -> HistoryResult<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

fn from_millis(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ChatSession> {
    Ok(ChatSession {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        last_message_at: from_millis(3, row.get(3)?)?,
        created_at: from_millis(4, row.get(4)?)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let sender: String = row.get(3)?;
    Ok(Message {
        id: row.get(0)?,
        session_id: row.get(1)?,
        content: row.get(2)?,
        sender: sender
            .parse::<Sender>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        created_at: from_millis(4, row.get(4)?)?,
    })
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn create_session(
        &self,
        owner_id: OwnerId,
        title: Option<&str>,
        first_message: Option<&str>,
    ) -> HistoryResult<ChatSession> {
        let title = resolve_title(title);
        let first_message = first_message.map(str::to_string);

        let session = self
            .with_conn("create_session", move |conn| {
                let now = now_millis();
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                tx.execute(
                    "INSERT INTO chat_histories (user_id, title, last_message_at, created_at)
                     VALUES (?1, ?2, ?3, ?3)",
                    params![owner_id, title, now.timestamp_millis()],
                )?;
                let id = tx.last_insert_rowid();

                if let Some(content) = first_message {
                    tx.execute(
                        "INSERT INTO messages (chat_history_id, content, sender, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![id, content, Sender::User.as_str(), now.timestamp_millis()],
                    )?;
                }

                tx.commit()?;

                Ok(ChatSession {
                    id,
                    owner_id,
                    title,
                    last_message_at: now,
                    created_at: now,
                })
            })
            .await?;

        tracing::debug!(
            "[SqliteHistoryStore] Created session {} for owner {}",
            session.id,
            owner_id
        );
        Ok(session)
    }

    async fn append_message(
        &self,
        session_id: SessionId,
        owner_id: OwnerId,
        sender: Sender,
        content: &str,
    ) -> HistoryResult<Message> {
        let content = content.to_string();

        self.with_conn("append_message", move |conn| {
            let now = now_millis();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let touched = tx.execute(
                "UPDATE chat_histories SET last_message_at = MAX(last_message_at, ?1)
                 WHERE id = ?2 AND user_id = ?3",
                params![now.timestamp_millis(), session_id, owner_id],
            )?;
            if touched == 0 {
                return Err(HistoryError::NotFound);
            }

            tx.execute(
                "INSERT INTO messages (chat_history_id, content, sender, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![session_id, content, sender.as_str(), now.timestamp_millis()],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;

            Ok(Message {
                id,
                session_id,
                content,
                sender,
                created_at: now,
            })
        })
        .await
    }

    async fn list_sessions(
        &self,
        owner_id: OwnerId,
        page: PageRequest,
    ) -> HistoryResult<SessionPage> {
        let result = self
            .with_conn("list_sessions", move |conn| {
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM chat_histories WHERE user_id = ?1",
                    params![owner_id],
                    |row| row.get(0),
                )?;

                let mut stmt = conn.prepare(
                    "SELECT id, user_id, title, last_message_at, created_at
                     FROM chat_histories
                     WHERE user_id = ?1
                     ORDER BY last_message_at DESC, id DESC
                     LIMIT ?2 OFFSET ?3",
                )?;
                let items = stmt
                    .query_map(
                        params![owner_id, i64::from(page.limit), page.offset() as i64],
                        session_from_row,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let total_items = total.max(0) as u64;
                Ok(SessionPage {
                    total_items,
                    total_pages: page.total_pages(total_items),
                    current_page: page.page,
                    items,
                })
            })
            .await?;

        tracing::debug!(
            "[SqliteHistoryStore] Listed {} of {} sessions for owner {}",
            result.items.len(),
            result.total_items,
            owner_id
        );
        Ok(result)
    }

    async fn get_session_detail(
        &self,
        session_id: SessionId,
        owner_id: OwnerId,
    ) -> HistoryResult<SessionDetail> {
        self.with_conn("get_session_detail", move |conn| {
            let session = conn
                .query_row(
                    "SELECT id, user_id, title, last_message_at, created_at
                     FROM chat_histories
                     WHERE id = ?1 AND user_id = ?2",
                    params![session_id, owner_id],
                    session_from_row,
                )
                .optional()?
                .ok_or(HistoryError::NotFound)?;

            let mut stmt = conn.prepare(
                "SELECT id, chat_history_id, content, sender, created_at
                 FROM messages
                 WHERE chat_history_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;
            let messages = stmt
                .query_map(params![session_id], message_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(SessionDetail { session, messages })
        })
        .await
    }
}
