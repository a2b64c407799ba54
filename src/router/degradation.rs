//! Fallback for search-index outages
//!
//! Wraps every index query. An index error or timeout becomes an unfiltered
//! store listing flagged `degraded`; store errors still propagate.

use super::HistoryPage;
use crate::core::{HistoryResult, OwnerId};
use crate::search::{SearchIndex, SearchQuery};
use crate::storage::HistoryStore;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

pub struct DegradationPolicy {
    index: Arc<dyn SearchIndex>,
    store: Arc<dyn HistoryStore>,
    timeout: Duration,
}

impl DegradationPolicy {
    pub fn new(index: Arc<dyn SearchIndex>, store: Arc<dyn HistoryStore>, timeout: Duration) -> Self {
        Self {
            index,
            store,
            timeout,
        }
    }

    pub async fn search(&self, owner_id: OwnerId, query: &SearchQuery) -> HistoryResult<HistoryPage> {
        match timeout(self.timeout, self.index.query(query)).await {
            Ok(Ok(hits)) => Ok(HistoryPage::from_hits(hits, query.page())),
            Ok(Err(e)) => {
                tracing::warn!(
                    "[DegradationPolicy] Search failed for owner {}, serving unfiltered listing: {}",
                    owner_id,
                    e
                );
                self.fallback(owner_id, query).await
            }
            Err(_) => {
                tracing::warn!(
                    "[DegradationPolicy] Search timed out after {:?} for owner {}, serving unfiltered listing",
                    self.timeout,
                    owner_id
                );
                self.fallback(owner_id, query).await
            }
        }
    }

    async fn fallback(&self, owner_id: OwnerId, query: &SearchQuery) -> HistoryResult<HistoryPage> {
        let page = self.store.list_sessions(owner_id, query.page()).await?;
        Ok(HistoryPage::from_store(page).into_degraded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HistoryError, PageRequest};
    use crate::search::InMemoryIndex;
    use crate::storage::InMemoryHistoryStore;

    #[tokio::test]
    async fn test_index_error_falls_back_to_store() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let index = Arc::new(InMemoryIndex::new());
        store.create_session(1, Some("a"), None).await.unwrap();
        index.set_available(false);

        let policy = DegradationPolicy::new(index, store, Duration::from_millis(200));
        let query = SearchQuery::builder(1).keyword(Some("zzz")).build();
        let page = policy.search(1, &query).await.unwrap();

        assert!(page.degraded);
        assert_eq!(page.total_items, 1);
    }

    #[tokio::test]
    async fn test_index_timeout_falls_back_to_store() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let index = Arc::new(InMemoryIndex::new());
        index.set_latency(Duration::from_millis(500));

        let policy = DegradationPolicy::new(index, store, Duration::from_millis(50));
        let query = SearchQuery::builder(1)
            .keyword(Some("x"))
            .page(PageRequest::new(2, 5).unwrap())
            .build();
        let page = policy.search(1, &query).await.unwrap();

        assert!(page.degraded);
        assert_eq!(page.current_page, 2);
    }

    #[tokio::test]
    async fn test_store_error_during_fallback_propagates() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let index = Arc::new(InMemoryIndex::new());
        index.set_available(false);
        store.set_available(false);

        let policy = DegradationPolicy::new(index, store, Duration::from_millis(200));
        let err = policy
            .search(1, &SearchQuery::builder(1).build())
            .await
            .unwrap_err();

        assert!(matches!(err, HistoryError::Store(_)));
    }
}
