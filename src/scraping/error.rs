//! Error taxonomy of the scraping engine
//!
//! Only [`ScrapeError`] ever reaches the caller of the coordinator. Fetch and
//! record failures are recovered inside the run and show up in the session
//! counters and processing logs instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::domain::repositories::StoreError;
use crate::domain::{Agency, RecordType, SessionId, SessionTransitionError};

/// Errors returned synchronously when starting or querying a run
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("No strategy registered for {agency}/{record_type}")]
    StrategyNotFound {
        agency: Agency,
        record_type: RecordType,
    },

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Session state error: {0}")]
    Transition(#[from] SessionTransitionError),

    #[error("Scraping worker aborted: {0}")]
    WorkerAborted(String),
}

/// Classified failure of one outbound fetch
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchFailure {
    #[error("HTTP request failed with status {status}")]
    Http { status: u16 },

    #[error("Network timeout after {timeout_ms}ms")]
    NetworkTimeout { timeout_ms: u64 },

    #[error("Fetch failed: {0}")]
    Other(String),
}

/// Failure processing a single record; always downgraded to outcome `error`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("Record rejected: {0}")]
    InvalidRecord(String),

    #[error("Detail fetch failed: {0}")]
    Detail(#[from] FetchFailure),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

/// Parameter validation failure reported by a strategy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvalidParams(pub String);

impl From<InvalidParams> for ScrapeError {
    fn from(err: InvalidParams) -> Self {
        Self::InvalidParams(err.0)
    }
}
