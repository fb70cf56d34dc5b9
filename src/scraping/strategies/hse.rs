//! Health and Safety Executive: page-based cases and notices
//!
//! The HSE registers are paginated newest-first. A run walks pages from
//! `start_page` upward until `end_page`, the configured page limit, or one of
//! the coordinator's stop conditions.

use async_trait::async_trait;
use std::sync::Arc;

use super::{FieldKind, FieldMapping, parse_page_param, reject_unknown_params, store_candidate};
use crate::domain::{Agency, Cursor, EnforcementStore, RawParams, RawRecord, RecordType, ScrapeParams, Session};
use crate::scraping::error::{FetchFailure, InvalidParams, ProcessingError};
use crate::scraping::fetcher::{FetchRequest, RecordFetcher};
use crate::scraping::strategy::{ProcessedRecord, ScrapeStrategy, StrategyDeps};

const PARAMS: &[&str] = &["start_page", "end_page"];

const CASE_FIELDS: FieldMapping = FieldMapping {
    key_field: "case_reference",
    fields: &[
        ("offender_name", "offender_name", FieldKind::Text),
        ("hearing_date", "action_date", FieldKind::Date),
        ("fine", "fine_amount", FieldKind::Amount),
        ("costs", "costs_amount", FieldKind::Amount),
        ("result", "result", FieldKind::Text),
        ("court_name", "court_name", FieldKind::Text),
        ("offence_breaches", "offence_description", FieldKind::Text),
        ("url", "regulator_url", FieldKind::Text),
        ("local_authority", "local_authority", FieldKind::Text),
    ],
};

const NOTICE_FIELDS: FieldMapping = FieldMapping {
    key_field: "notice_number",
    fields: &[
        ("recipient_name", "offender_name", FieldKind::Text),
        ("issue_date", "action_date", FieldKind::Date),
        ("notice_type", "notice_type", FieldKind::Text),
        ("compliance_date", "compliance_date", FieldKind::Date),
        ("description", "offence_description", FieldKind::Text),
        ("url", "regulator_url", FieldKind::Text),
        ("local_authority", "local_authority", FieldKind::Text),
    ],
};

pub struct HseStrategy {
    record_type: RecordType,
    mapping: FieldMapping,
    fetcher: Arc<dyn RecordFetcher>,
    store: Arc<dyn EnforcementStore>,
}

impl HseStrategy {
    #[must_use]
    pub fn new(record_type: RecordType, deps: &StrategyDeps) -> Self {
        let mapping = match record_type {
            RecordType::Case => CASE_FIELDS,
            RecordType::Notice => NOTICE_FIELDS,
        };
        Self {
            record_type,
            mapping,
            fetcher: deps.fetcher.clone(),
            store: deps.store.clone(),
        }
    }

    /// Registry factory
    pub fn build(deps: &StrategyDeps, record_type: RecordType) -> Arc<dyn ScrapeStrategy> {
        Arc::new(Self::new(record_type, deps))
    }
}

#[async_trait]
impl ScrapeStrategy for HseStrategy {
    fn agency(&self) -> Agency {
        Agency::Hse
    }

    fn record_type(&self) -> RecordType {
        self.record_type
    }

    fn validate_params(&self, raw: &RawParams) -> Result<ScrapeParams, InvalidParams> {
        reject_unknown_params(raw, PARAMS)?;
        let start_page = parse_page_param(raw, "start_page")?.unwrap_or(1);
        let end_page = parse_page_param(raw, "end_page")?;
        if let Some(end) = end_page {
            if end < start_page {
                return Err(InvalidParams(format!(
                    "end_page ({end}) must not be before start_page ({start_page})"
                )));
            }
        }
        Ok(ScrapeParams::PageRange { start_page, end_page })
    }

    fn next_cursor(&self, params: &ScrapeParams, previous: Option<&Cursor>) -> Option<Cursor> {
        let ScrapeParams::PageRange { start_page, end_page } = params else {
            return None;
        };
        let page = match previous {
            None => *start_page,
            Some(Cursor::Page { page }) => page.checked_add(1)?,
            Some(Cursor::DateRange { .. }) => return None,
        };
        match end_page {
            Some(end) if page > *end => None,
            _ => Some(Cursor::Page { page }),
        }
    }

    async fn fetch(&self, _params: &ScrapeParams, cursor: &Cursor) -> Result<Vec<RawRecord>, FetchFailure> {
        self.fetcher
            .fetch(&FetchRequest {
                agency: Agency::Hse,
                record_type: self.record_type,
                cursor: cursor.clone(),
            })
            .await
    }

    async fn process_one(&self, record: RawRecord, _session: &Session) -> Result<ProcessedRecord, ProcessingError> {
        let candidate = self.mapping.to_candidate(Agency::Hse, self.record_type, &record)?;
        store_candidate(self.store.as_ref(), &candidate).await
    }

    fn progress_percentage(&self, session: &Session) -> f64 {
        let planned = match &session.params {
            ScrapeParams::PageRange {
                start_page,
                end_page: Some(end),
            } => (end - start_page + 1).min(session.limits.max_pages_per_run),
            _ => session.limits.max_pages_per_run,
        };
        if planned == 0 {
            return 0.0;
        }
        (f64::from(session.pages_processed) / f64::from(planned) * 100.0).clamp(0.0, 100.0)
    }
}
