//! Chat history service facade
//!
//! This module provides a simple async interface over the store, the
//! sync actor and the query router. Callers pass the authenticated owner
//! id explicitly on every call.

use crate::config::Settings;
use crate::core::{
    model::non_blank, ChatSession, HistoryError, HistoryResult, Message, NewChatRequest, OwnerId,
    Sender, SessionDetail, SessionId,
};
use crate::router::{HistoryPage, HistoryQuery, QueryRouter};
use crate::storage::HistoryStore;
use crate::sync::{SyncCoordinatorHandle, SyncState, SyncStats};
use anyhow::Result;
use std::sync::Arc;

/// Owner-scoped chat history operations
///
/// # Example
/// ```no_run
/// use chatvault::{connect, HistoryQuery, NewChatRequest, Settings};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let service = connect(Settings::new()?).await?;
///     let request = NewChatRequest::new(Some("Trip planning".into()), None);
///     let session = service.create_session(7, request).await?;
///     let page = service.list_chat_histories(7, &HistoryQuery::default()).await?;
///     println!("{} -> {} sessions", session.id, page.total_items);
///     service.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct ChatHistoryService {
    store: Arc<dyn HistoryStore>,
    router: QueryRouter,
    sync: SyncCoordinatorHandle,
}

impl ChatHistoryService {
    pub fn new(store: Arc<dyn HistoryStore>, router: QueryRouter, sync: SyncCoordinatorHandle) -> Self {
        Self {
            store,
            router,
            sync,
        }
    }

    /// Commit a new session, then queue its projection. Index trouble never
    /// fails this call once the store has committed.
    pub async fn create_session(
        &self,
        owner_id: OwnerId,
        request: NewChatRequest,
    ) -> HistoryResult<ChatSession> {
        request.validate()?;

        let session = self
            .store
            .create_session(owner_id, request.title(), request.first_message())
            .await
            .inspect_err(|e| tracing::error!("[ChatHistoryService] Create failed: {}", e))?;

        tracing::info!(
            "[ChatHistoryService] Owner {} created session {}",
            owner_id,
            session.id
        );
        self.sync.submit(session.id, owner_id);
        Ok(session)
    }

    pub async fn append_message(
        &self,
        owner_id: OwnerId,
        session_id: SessionId,
        sender: Sender,
        content: &str,
    ) -> HistoryResult<Message> {
        let content = non_blank(Some(content))
            .ok_or_else(|| HistoryError::validation("message content must not be blank"))?;

        let message = self
            .store
            .append_message(session_id, owner_id, sender, content)
            .await?;

        tracing::debug!(
            "[ChatHistoryService] Appended message {} to session {}",
            message.id,
            session_id
        );
        self.sync.submit(session_id, owner_id);
        Ok(message)
    }

    pub async fn list_chat_histories(
        &self,
        owner_id: OwnerId,
        query: &HistoryQuery,
    ) -> HistoryResult<HistoryPage> {
        self.router.list(owner_id, query).await
    }

    /// Always served from the store
    pub async fn get_chat_detail(
        &self,
        owner_id: OwnerId,
        session_id: SessionId,
    ) -> HistoryResult<SessionDetail> {
        self.store.get_session_detail(session_id, owner_id).await
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.sync.stats()
    }

    pub fn sync_state(&self, session_id: SessionId) -> SyncState {
        self.sync.state_of(session_id)
    }

    /// Wait for every queued projection to finish
    pub async fn flush_sync(&self) -> Result<()> {
        self.sync.flush().await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sync.shutdown().await?;
        tracing::info!("[ChatHistoryService] Shutdown complete");
        Ok(())
    }
}

/// Assemble a service over already-built backends
pub fn with_backends(
    store: Arc<dyn HistoryStore>,
    index: Arc<dyn crate::search::SearchIndex>,
    settings: &Settings,
) -> ChatHistoryService {
    let sync = SyncCoordinatorHandle::new(
        Arc::clone(&store),
        Arc::clone(&index),
        settings.sync.clone(),
    );
    let router = QueryRouter::new(
        Arc::clone(&store),
        index,
        settings.search.timeout(),
        settings.pagination.clone(),
    );
    ChatHistoryService::new(store, router, sync)
}
