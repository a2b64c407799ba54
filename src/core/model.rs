use crate::core::error::{HistoryError, HistoryResult};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type OwnerId = i64;
pub type SessionId = i64;

/// Title given to sessions created without one
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Current time truncated to millisecond precision, the resolution both
/// backends persist.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

impl FromStr for Sender {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(Self::User),
            // legacy rows written with the system label
            "Assistant" | "System" => Ok(Self::Assistant),
            other => Err(HistoryError::store(format!("unknown message sender '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: SessionId,
    #[serde(rename = "userId")]
    pub owner_id: OwnerId,
    pub title: String,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    #[serde(rename = "chatHistoryId")]
    pub session_id: SessionId,
    pub content: String,
    pub sender: Sender,
    pub created_at: DateTime<Utc>,
}

/// A session together with its messages, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: ChatSession,
    pub messages: Vec<Message>,
}

/// Listing row returned by both routing paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&ChatSession> for SessionSummary {
    fn from(session: &ChatSession) -> Self {
        Self {
            id: session.id,
            title: session.title.clone(),
            last_message_at: session.last_message_at,
            created_at: session.created_at,
        }
    }
}

impl From<SearchDocument> for SessionSummary {
    fn from(doc: SearchDocument) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            last_message_at: doc.last_message_at,
            created_at: doc.created_at,
        }
    }
}

/// Read-optimized projection of a session stored in the search index.
///
/// Keyed by the session id. Never authoritative: it may be missing or stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub id: SessionId,
    #[serde(rename = "userId")]
    pub owner_id: OwnerId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SearchDocument {
    /// Project a committed session; `content` aggregates every message in order.
    pub fn from_detail(detail: &SessionDetail) -> Self {
        let content = detail
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            id: detail.session.id,
            owner_id: detail.session.owner_id,
            title: detail.session.title.clone(),
            content,
            last_message_at: detail.session.last_message_at,
            created_at: detail.session.created_at,
        }
    }
}

/// Write request for a new session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChatRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub first_message: Option<String>,
}

impl NewChatRequest {
    pub fn new(title: Option<String>, first_message: Option<String>) -> Self {
        Self {
            title,
            first_message,
        }
    }

    /// Rejects requests carrying neither a title nor a first message.
    pub fn validate(&self) -> HistoryResult<()> {
        if non_blank(self.title.as_deref()).is_none()
            && non_blank(self.first_message.as_deref()).is_none()
        {
            return Err(HistoryError::validation(
                "either a title or a first message is required",
            ));
        }
        Ok(())
    }

    pub fn first_message(&self) -> Option<&str> {
        non_blank(self.first_message.as_deref())
    }

    pub fn title(&self) -> Option<&str> {
        non_blank(self.title.as_deref())
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> HistoryResult<Self> {
        if page == 0 {
            return Err(HistoryError::validation("page must be at least 1"));
        }
        if limit == 0 {
            return Err(HistoryError::validation("limit must be at least 1"));
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    pub fn total_pages(&self, total_items: u64) -> u64 {
        total_items.div_ceil(u64::from(self.limit))
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

/// One page of sessions straight from the authoritative store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPage {
    pub total_items: u64,
    pub total_pages: u64,
    pub current_page: u32,
    pub items: Vec<ChatSession>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

impl FromStr for SortOrder {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" | "" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            other => Err(HistoryError::validation(format!(
                "sort must be 'newest' or 'oldest', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Newest => write!(f, "newest"),
            Self::Oldest => write!(f, "oldest"),
        }
    }
}

/// Inclusive `lastMessageAt` bounds derived from calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// `start` covers its whole day from midnight, `end` up to its last millisecond.
    pub fn from_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> HistoryResult<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(HistoryError::validation("startDate must not be after endDate"));
            }
        }

        let midnight = NaiveTime::from_hms_opt(0, 0, 0)
            .ok_or_else(|| HistoryError::validation("invalid start-of-day time"))?;
        let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
            .ok_or_else(|| HistoryError::validation("invalid end-of-day time"))?;

        Ok(Self {
            start: start.map(|d| d.and_time(midnight).and_utc()),
            end: end.map(|d| d.and_time(end_of_day).and_utc()),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| instant >= s) && self.end.map_or(true, |e| instant <= e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: SessionId) -> ChatSession {
        let at = now_millis();
        ChatSession {
            id,
            owner_id: 7,
            title: "Trip planning".to_string(),
            last_message_at: at,
            created_at: at,
        }
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let page = PageRequest::new(1, 10).unwrap();
        assert_eq!(page.total_pages(0), 0);
        assert_eq!(page.total_pages(10), 1);
        assert_eq!(page.total_pages(11), 2);
        assert_eq!(PageRequest::new(3, 4).unwrap().offset(), 8);
    }

    #[test]
    fn test_page_request_rejects_zero() {
        assert!(PageRequest::new(0, 10).is_err());
        assert!(PageRequest::new(1, 0).is_err());
    }

    #[test]
    fn test_new_chat_request_needs_title_or_message() {
        assert!(NewChatRequest::new(None, None).validate().is_err());
        assert!(NewChatRequest::new(Some("  ".into()), Some("".into()))
            .validate()
            .is_err());
        assert!(NewChatRequest::new(None, Some("hi".into())).validate().is_ok());
        assert!(NewChatRequest::new(Some("t".into()), None).validate().is_ok());
    }

    #[test]
    fn test_document_aggregates_messages_in_order() {
        let s = session(3);
        let detail = SessionDetail {
            messages: vec![
                Message {
                    id: 1,
                    session_id: 3,
                    content: "first".into(),
                    sender: Sender::User,
                    created_at: s.created_at,
                },
                Message {
                    id: 2,
                    session_id: 3,
                    content: "second".into(),
                    sender: Sender::Assistant,
                    created_at: s.created_at,
                },
            ],
            session: s,
        };

        let doc = SearchDocument::from_detail(&detail);
        assert_eq!(doc.id, 3);
        assert_eq!(doc.owner_id, 7);
        assert_eq!(doc.content, "first\nsecond");
    }

    #[test]
    fn test_document_serializes_index_field_names() {
        let doc = SearchDocument::from_detail(&SessionDetail {
            session: session(5),
            messages: vec![],
        });
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["userId"], 7);
        assert!(json.get("lastMessageAt").is_some());
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["content"], "");
    }

    #[test]
    fn test_date_range_is_inclusive_of_whole_days() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let range = DateRange::from_dates(Some(day), Some(day)).unwrap();
        let morning = day.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let night = day.and_hms_milli_opt(23, 59, 59, 999).unwrap().and_utc();
        let next = NaiveDate::from_ymd_opt(2024, 5, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();

        assert!(range.contains(morning));
        assert!(range.contains(night));
        assert!(!range.contains(next));
    }

    #[test]
    fn test_date_range_rejects_inverted_bounds() {
        let a = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(DateRange::from_dates(Some(a), Some(b)).is_err());
    }

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!("oldest".parse::<SortOrder>().unwrap(), SortOrder::Oldest);
        assert_eq!("NEWEST".parse::<SortOrder>().unwrap(), SortOrder::Newest);
        assert!("random".parse::<SortOrder>().is_err());
    }
}
