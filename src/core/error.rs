//! Error taxonomy shared by every component
//!
//! Authoritative-path failures (`Store`) always propagate. Index failures
//! (`Index`) are caught at their local boundary: the sync worker swallows them
//! and the degradation policy turns them into a fallback listing.

use thiserror::Error;

pub type HistoryResult<T> = Result<T, HistoryError>;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("validation failed: {0}")]
    Validation(String),
    /// Session absent or owned by someone else; the two are never told apart.
    #[error("chat history does not exist or is not accessible")]
    NotFound,
    #[error("store error: {0}")]
    Store(String),
    #[error("index error: {0}")]
    Index(String),
}

impl HistoryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::Index(message.into())
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<rusqlite::Error> for HistoryError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<reqwest::Error> for HistoryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Index(err.to_string())
    }
}
