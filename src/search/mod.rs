//! Search Index Abstraction
//!
//! Information Hiding:
//! - Backend wire format hidden behind trait; callers only see typed queries
//! - Documents are projections, never the source of truth
//! - Every failure surfaces as `HistoryError::Index` so callers can contain it

use crate::core::{HistoryResult, SearchDocument};
use async_trait::async_trait;

pub mod elastic;
pub mod memory;
pub mod query;

pub use elastic::ElasticsearchIndex;
pub use memory::InMemoryIndex;
pub use query::{Clause, Field, SearchQuery, SearchQueryBuilder};

/// Matching documents for one page, plus the total across all pages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub total: u64,
    pub hits: Vec<SearchDocument>,
}

/// Full-text index over session projections
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the document schema if it does not exist yet. Never destructive.
    async fn ensure_schema(&self) -> HistoryResult<()>;

    /// Overwrite the document keyed by `doc.id`; last write wins.
    async fn upsert_document(&self, doc: &SearchDocument) -> HistoryResult<()>;

    /// Execute a query built by [`SearchQueryBuilder`]
    async fn query(&self, query: &SearchQuery) -> HistoryResult<SearchHits>;
}
