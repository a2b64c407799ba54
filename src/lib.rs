//! Chatvault - owner-scoped chat history with a search projection
//!
//! A relational store is the system of record. A search index holds a
//! best-effort projection of every session, kept current by a background
//! sync actor, and read queries fall back to the store whenever the index
//! misbehaves.

pub mod config;
pub mod core;
pub mod router;
pub mod search;
pub mod storage;
pub mod sync;
pub mod utils;

pub mod api;
pub mod cli;

pub use api::{with_backends, ChatHistoryService};
pub use config::Settings;
pub use crate::core::{
    ChatSession, HistoryError, HistoryResult, Message, NewChatRequest, Sender, SessionDetail,
    SessionSummary, SortOrder,
};
pub use router::{HistoryPage, HistoryQuery};
pub use sync::{SyncState, SyncStats};

use search::{ElasticsearchIndex, SearchIndex};
use std::sync::Arc;
use storage::SqliteHistoryStore;

/// Build a service against the configured SQLite file and Elasticsearch
/// cluster. An unreachable cluster is logged and tolerated; an unusable
/// database is not.
pub async fn connect(settings: Settings) -> anyhow::Result<ChatHistoryService> {
    let store =
        SqliteHistoryStore::open(&settings.database.path, settings.database.timeout()).await?;
    let index = ElasticsearchIndex::new(&settings.search)?;

    if let Err(e) = index.ensure_schema().await {
        tracing::warn!(
            "[Chatvault] Search index '{}' not ready, searches will degrade: {}",
            index.index_name(),
            e
        );
    }

    tracing::info!(
        "[Chatvault] Connected to {} and {}",
        settings.database.path,
        settings.search.url
    );
    Ok(with_backends(Arc::new(store), Arc::new(index), &settings))
}
