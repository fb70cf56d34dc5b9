//! The per-(agency, record-type) capability interface
//!
//! A strategy knows how to validate its parameters, which unit comes next,
//! how to ask its fetch collaborator for a unit, and how to turn one raw row
//! into a stored record. It owns no I/O of its own and no run state; the
//! coordinator drives it and owns the session.

use async_trait::async_trait;
use std::sync::Arc;

use super::error::{FetchFailure, InvalidParams, ProcessingError};
use super::fetcher::RecordFetcher;
use super::rate_limiter::ScrapeRateLimiter;
use crate::domain::{
    Agency, Cursor, EnforcementStore, ItemSummary, RawParams, RawRecord, RecordOutcome, RecordType,
    ScrapeParams, Session,
};

/// Outcome of one record plus its audit summary
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRecord {
    pub outcome: RecordOutcome,
    pub summary: ItemSummary,
}

/// Collaborators handed to every strategy at registry construction
#[derive(Clone)]
pub struct StrategyDeps {
    pub fetcher: Arc<dyn RecordFetcher>,
    pub store: Arc<dyn EnforcementStore>,
    pub rate_limiter: Arc<ScrapeRateLimiter>,
}

#[async_trait]
pub trait ScrapeStrategy: Send + Sync {
    fn agency(&self) -> Agency;

    fn record_type(&self) -> RecordType;

    fn display_name(&self) -> String {
        format!("{} {}s", self.agency().display_name(), self.record_type())
    }

    /// Normalizes caller parameters or explains why they are unusable.
    fn validate_params(&self, raw: &RawParams) -> Result<ScrapeParams, InvalidParams>;

    /// Unit after `previous`, or the first unit when `previous` is `None`.
    /// `None` means the parameter range is exhausted.
    fn next_cursor(&self, params: &ScrapeParams, previous: Option<&Cursor>) -> Option<Cursor>;

    /// Raw records of one unit. The caller applies rate limiting and timeout.
    async fn fetch(&self, params: &ScrapeParams, cursor: &Cursor) -> Result<Vec<RawRecord>, FetchFailure>;

    /// Normalizes and persists one record through the shared dedup routine.
    async fn process_one(&self, record: RawRecord, session: &Session) -> Result<ProcessedRecord, ProcessingError>;

    /// Completion estimate in `[0, 100]`.
    fn progress_percentage(&self, session: &Session) -> f64;
}
