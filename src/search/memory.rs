//! In-Memory Search Index
//!
//! Information Hiding:
//! - Document map and clause evaluation hidden behind the index trait
//! - Outage and latency injection let callers exercise degradation paths
//! - Suitable for testing and single-process deployments

use super::query::{Clause, Field};
use super::{SearchHits, SearchIndex, SearchQuery};
use crate::core::{HistoryError, HistoryResult, SearchDocument, SessionId, SortOrder};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub struct InMemoryIndex {
    documents: Arc<RwLock<HashMap<SessionId, SearchDocument>>>,
    schema_ready: AtomicBool,
    available: AtomicBool,
    latency_ms: AtomicU64,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
            schema_ready: AtomicBool::new(false),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// While unavailable every call fails with an index error
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay applied before every call, for timeout tests
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn schema_ready(&self) -> bool {
        self.schema_ready.load(Ordering::SeqCst)
    }

    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn document(&self, id: SessionId) -> Option<SearchDocument> {
        self.documents.read().await.get(&id).cloned()
    }

    async fn enter(&self, operation: &str) -> HistoryResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(HistoryError::index(format!(
                "in-memory index unavailable during {}",
                operation
            )));
        }
        Ok(())
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn ensure_schema(&self) -> HistoryResult<()> {
        self.enter("ensure_schema").await?;
        if !self.schema_ready.swap(true, Ordering::SeqCst) {
            tracing::info!("[InMemoryIndex] Created document schema");
        }
        Ok(())
    }

    async fn upsert_document(&self, doc: &SearchDocument) -> HistoryResult<()> {
        self.enter("upsert_document").await?;
        let mut documents = self.documents.write().await;
        documents.insert(doc.id, doc.clone());
        tracing::debug!("[InMemoryIndex] Upserted document {}", doc.id);
        Ok(())
    }

    async fn query(&self, query: &SearchQuery) -> HistoryResult<SearchHits> {
        self.enter("query").await?;

        let documents = self.documents.read().await;
        let mut matched: Vec<&SearchDocument> = documents
            .values()
            .filter(|doc| {
                query.must().iter().all(|c| evaluate(c, doc))
                    && query.filter().iter().all(|c| evaluate(c, doc))
            })
            .collect();

        match query.sort() {
            SortOrder::Newest => matched.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at)),
            SortOrder::Oldest => matched.sort_by(|a, b| a.last_message_at.cmp(&b.last_message_at)),
        }

        let total = matched.len() as u64;
        let hits = matched
            .into_iter()
            .skip(query.from() as usize)
            .take(query.size() as usize)
            .cloned()
            .collect();

        Ok(SearchHits { total, hits })
    }
}

fn evaluate(clause: &Clause, doc: &SearchDocument) -> bool {
    match clause {
        Clause::Term { field, value } => match field {
            Field::Owner => doc.owner_id == *value,
            _ => false,
        },
        Clause::Wildcard { field, needle, .. } => {
            field.text(doc).to_lowercase().contains(needle.as_str())
        }
        Clause::Fuzzy { field, query, .. } => fuzzy_match(field.text(doc), query),
        Clause::Range { field, gte, lte } => {
            let instant = match field {
                Field::LastMessageAt => doc.last_message_at,
                _ => return false,
            };
            gte.map_or(true, |g| instant >= g) && lte.map_or(true, |l| instant <= l)
        }
        Clause::AnyOf {
            clauses,
            minimum_should_match,
        } => {
            let hits = clauses.iter().filter(|c| evaluate(c, doc)).count();
            hits >= *minimum_should_match as usize
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Edits tolerated for a term under AUTO fuzziness
fn auto_fuzziness(term: &str) -> usize {
    match term.chars().count() {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Any query term within its edit budget of any field term
fn fuzzy_match(text: &str, query: &str) -> bool {
    let field_terms = tokenize(text);
    tokenize(query).iter().any(|q| {
        let budget = auto_fuzziness(q);
        field_terms
            .iter()
            .any(|t| strsim::osa_distance(q, t) <= budget)
    })
}
