//! Fetch collaborator interface
//!
//! Per-agency page parsing and raw HTTP access live behind this trait. The
//! engine only ever asks for "the records of this unit" and, for agencies
//! that need it, "the detail fields of this record".

use async_trait::async_trait;

use super::error::FetchFailure;
use crate::domain::{Agency, Cursor, RawRecord, RecordType};

/// What a strategy asks its fetcher for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub agency: Agency,
    pub record_type: RecordType,
    pub cursor: Cursor,
}

#[async_trait]
pub trait RecordFetcher: Send + Sync {
    /// Records of one unit, in source order (newest first).
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawRecord>, FetchFailure>;

    /// Second round-trip for agencies whose list rows are incomplete.
    async fn fetch_detail(
        &self,
        _agency: Agency,
        _record_type: RecordType,
        _regulator_id: &str,
    ) -> Result<Option<RawRecord>, FetchFailure> {
        Ok(None)
    }
}
