//! Domain model and error types shared by the store, the index and the router

pub mod error;
pub mod model;

pub use error::{HistoryError, HistoryResult};
pub use model::*;
