//! Read-path routing
//!
//! Requests carrying a keyword or a date bound go to the search index (behind
//! the degradation policy); everything else is a plain store listing. Both
//! paths come back as the same [`HistoryPage`] envelope.

pub mod degradation;

pub use degradation::DegradationPolicy;

use crate::config::settings::PaginationConfig;
use crate::core::{
    model::non_blank, DateRange, HistoryResult, OwnerId, PageRequest, SessionPage,
    SessionSummary, SortOrder,
};
use crate::search::{SearchHits, SearchIndex, SearchQuery};
use crate::storage::HistoryStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Read request parameters; the owner always comes from the authenticated caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub sort: Option<SortOrder>,
}

impl HistoryQuery {
    pub fn keyword(&self) -> Option<&str> {
        non_blank(self.keyword.as_deref())
    }

    pub fn has_search_filters(&self) -> bool {
        self.keyword().is_some() || self.start_date.is_some() || self.end_date.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Store,
    Index,
}

/// Paginated response envelope shared by both routes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub total_items: u64,
    pub total_pages: u64,
    pub current_page: u32,
    pub chat_histories: Vec<SessionSummary>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl HistoryPage {
    pub fn from_store(page: SessionPage) -> Self {
        Self {
            total_items: page.total_items,
            total_pages: page.total_pages,
            current_page: page.current_page,
            chat_histories: page.items.iter().map(SessionSummary::from).collect(),
            degraded: false,
        }
    }

    pub fn from_hits(hits: SearchHits, page: PageRequest) -> Self {
        Self {
            total_items: hits.total,
            total_pages: page.total_pages(hits.total),
            current_page: page.page,
            chat_histories: hits.hits.into_iter().map(SessionSummary::from).collect(),
            degraded: false,
        }
    }

    pub fn into_degraded(mut self) -> Self {
        self.degraded = true;
        self
    }
}

pub struct QueryRouter {
    store: Arc<dyn HistoryStore>,
    policy: DegradationPolicy,
    pagination: PaginationConfig,
}

impl QueryRouter {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        index: Arc<dyn SearchIndex>,
        search_timeout: Duration,
        pagination: PaginationConfig,
    ) -> Self {
        Self {
            policy: DegradationPolicy::new(index, Arc::clone(&store), search_timeout),
            store,
            pagination,
        }
    }

    /// Pure function of request shape, never of backend health
    pub fn route(query: &HistoryQuery) -> Route {
        if query.has_search_filters() {
            Route::Index
        } else {
            Route::Store
        }
    }

    fn page_request(&self, query: &HistoryQuery) -> HistoryResult<PageRequest> {
        let limit = query
            .limit
            .unwrap_or(self.pagination.default_limit)
            .min(self.pagination.max_limit.max(1));
        PageRequest::new(query.page.unwrap_or(1), limit)
    }

    pub async fn list(&self, owner_id: OwnerId, query: &HistoryQuery) -> HistoryResult<HistoryPage> {
        let page = self.page_request(query)?;

        match Self::route(query) {
            Route::Store => {
                tracing::debug!("[QueryRouter] Owner {} listing from store", owner_id);
                let listing = self.store.list_sessions(owner_id, page).await?;
                Ok(HistoryPage::from_store(listing))
            }
            Route::Index => {
                let range = DateRange::from_dates(query.start_date, query.end_date)?;
                let search = SearchQuery::builder(owner_id)
                    .keyword(query.keyword())
                    .date_range(range)
                    .sort(query.sort.unwrap_or_default())
                    .page(page)
                    .build();
                tracing::debug!("[QueryRouter] Owner {} searching index", owner_id);
                self.policy.search(owner_id, &search).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HistoryError;
    use crate::search::InMemoryIndex;
    use crate::storage::InMemoryHistoryStore;

    fn router(store: Arc<InMemoryHistoryStore>, index: Arc<InMemoryIndex>) -> QueryRouter {
        QueryRouter::new(
            store,
            index,
            Duration::from_millis(200),
            PaginationConfig::default(),
        )
    }

    #[test]
    fn test_route_depends_only_on_request_shape() {
        assert_eq!(QueryRouter::route(&HistoryQuery::default()), Route::Store);

        let blank = HistoryQuery {
            keyword: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(QueryRouter::route(&blank), Route::Store);

        let keyword = HistoryQuery {
            keyword: Some("trip".into()),
            ..Default::default()
        };
        assert_eq!(QueryRouter::route(&keyword), Route::Index);

        let dated = HistoryQuery {
            end_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        };
        assert_eq!(QueryRouter::route(&dated), Route::Index);
    }

    #[tokio::test]
    async fn test_plain_listing_matches_store() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let index = Arc::new(InMemoryIndex::new());
        for title in ["a", "b", "c"] {
            store.create_session(1, Some(title), None).await.unwrap();
        }

        let routed = router(store.clone(), index)
            .list(1, &HistoryQuery::default())
            .await
            .unwrap();
        let direct = store
            .list_sessions(1, PageRequest::default())
            .await
            .unwrap();

        assert_eq!(routed, HistoryPage::from_store(direct));
        assert!(!routed.degraded);
    }

    #[tokio::test]
    async fn test_limit_is_clamped_and_zero_rejected() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let router = router(store, Arc::new(InMemoryIndex::new()));

        let page = router
            .page_request(&HistoryQuery {
                limit: Some(10_000),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.limit, 100);

        let err = router
            .list(
                1,
                &HistoryQuery {
                    page: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_inverted_dates_are_rejected() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let router = router(store, Arc::new(InMemoryIndex::new()));

        let err = router
            .list(
                1,
                &HistoryQuery {
                    start_date: NaiveDate::from_ymd_opt(2024, 2, 1),
                    end_date: NaiveDate::from_ymd_opt(2024, 1, 1),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::Validation(_)));
    }

    #[test]
    fn test_degraded_flag_only_serialized_when_set() {
        let page = HistoryPage {
            total_items: 0,
            total_pages: 0,
            current_page: 1,
            chat_histories: vec![],
            degraded: false,
        };
        let json = serde_json::to_value(&page).unwrap();
        assert!(json.get("degraded").is_none());
        assert_eq!(json["chatHistories"], serde_json::json!([]));

        let json = serde_json::to_value(page.into_degraded()).unwrap();
        assert_eq!(json["degraded"], true);
    }
}
