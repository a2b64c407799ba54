//! Authoritative History Storage
//!
//! Information Hiding:
//! - Relational schema and transaction handling hidden behind trait
//! - Allows swapping between SQLite and in-memory backends without API changes
//! - Owner scoping is part of every signature, never left to callers

use crate::core::{
    ChatSession, HistoryResult, Message, OwnerId, PageRequest, Sender, SessionDetail, SessionId,
    SessionPage, DEFAULT_TITLE,
};
use async_trait::async_trait;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryHistoryStore;
pub use sqlite::SqliteHistoryStore;

/// System of record for chat sessions and their messages
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Create a session, plus its first message in the same transaction when given.
    /// A blank title falls back to [`DEFAULT_TITLE`].
    async fn create_session(
        &self,
        owner_id: OwnerId,
        title: Option<&str>,
        first_message: Option<&str>,
    ) -> HistoryResult<ChatSession>;

    /// Append a message and bump the session's `last_message_at` atomically.
    /// Fails with `NotFound` when the session is not owned by `owner_id`.
    async fn append_message(
        &self,
        session_id: SessionId,
        owner_id: OwnerId,
        sender: Sender,
        content: &str,
    ) -> HistoryResult<Message>;

    /// Owner's sessions, most recently active first
    async fn list_sessions(&self, owner_id: OwnerId, page: PageRequest)
        -> HistoryResult<SessionPage>;

    /// Session with messages oldest first. Absent and foreign sessions both
    /// yield `NotFound`.
    async fn get_session_detail(
        &self,
        session_id: SessionId,
        owner_id: OwnerId,
    ) -> HistoryResult<SessionDetail>;
}

pub(crate) fn resolve_title(title: Option<&str>) -> String {
    title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TITLE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_title_uses_placeholder() {
        assert_eq!(resolve_title(None), DEFAULT_TITLE);
        assert_eq!(resolve_title(Some("   ")), DEFAULT_TITLE);
        assert_eq!(resolve_title(Some(" Trip ")), "Trip");
    }
}
