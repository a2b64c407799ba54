//! In-Memory History Storage
//!
//! Information Hiding:
//! - HashMap storage structure hidden from users
//! - Thread-safe access via RwLock hidden behind async interface
//! - Suitable for testing and ephemeral sessions

use super::{resolve_title, HistoryStore};
use crate::core::{
    now_millis, ChatSession, HistoryError, HistoryResult, Message, OwnerId, PageRequest, Sender,
    SessionDetail, SessionId, SessionPage,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory store using a HashMap keyed by session id.
/// Data is lost when process terminates
pub struct InMemoryHistoryStore {
    sessions: Arc<RwLock<HashMap<SessionId, SessionDetail>>>,
    next_session_id: AtomicI64,
    next_message_id: AtomicI64,
    available: AtomicBool,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_session_id: AtomicI64::new(1),
            next_message_id: AtomicI64::new(1),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: every call fails with a store error while unavailable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> HistoryResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(HistoryError::store("in-memory store is unavailable"))
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn create_session(
        &self,
        owner_id: OwnerId,
        title: Option<&str>,
        first_message: Option<&str>,
    ) -> HistoryResult<ChatSession> {
        self.check_available()?;

        let now = now_millis();
        let session = ChatSession {
            id: self.next_session_id.fetch_add(1, Ordering::SeqCst),
            owner_id,
            title: resolve_title(title),
            last_message_at: now,
            created_at: now,
        };

        let messages = first_message
            .map(|content| {
                vec![Message {
                    id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
                    session_id: session.id,
                    content: content.to_string(),
                    sender: Sender::User,
                    created_at: now,
                }]
            })
            .unwrap_or_default();

        let mut sessions = self.sessions.write().await;
        sessions.insert(
            session.id,
            SessionDetail {
                session: session.clone(),
                messages,
            },
        );
        tracing::debug!(
            "[InMemoryHistoryStore] Created session {} for owner {}",
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
        self.check_available()?;

        let mut sessions = self.sessions.write().await;
        let detail = sessions
            .get_mut(&session_id)
            .filter(|d| d.session.owner_id == owner_id)
            .ok_or(HistoryError::NotFound)?;

        let now = now_millis();
        let message = Message {
            id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
            session_id,
            content: content.to_string(),
            sender,
            created_at: now,
        };
        detail.session.last_message_at = detail.session.last_message_at.max(now);
        detail.messages.push(message.clone());
        Ok(message)
    }

    async fn list_sessions(
        &self,
        owner_id: OwnerId,
        page: PageRequest,
    ) -> HistoryResult<SessionPage> {
        self.check_available()?;

        let sessions = self.sessions.read().await;
        let mut owned: Vec<ChatSession> = sessions
            .values()
            .filter(|d| d.session.owner_id == owner_id)
            .map(|d| d.session.clone())
            .collect();
        owned.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total_items = owned.len() as u64;
        let items = owned
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();

        Ok(SessionPage {
            total_items,
            total_pages: page.total_pages(total_items),
            current_page: page.page,
            items,
        })
    }

    async fn get_session_detail(
        &self,
        session_id: SessionId,
        owner_id: OwnerId,
    ) -> HistoryResult<SessionDetail> {
        self.check_available()?;

        let sessions = self.sessions.read().await;
        sessions
            .get(&session_id)
            .filter(|d| d.session.owner_id == owner_id)
            .cloned()
            .ok_or(HistoryError::NotFound)
    }
}
