//! Environment Agency: date-range cases and notices
//!
//! The EA register is searched by action date, so a run is one logical fetch
//! over `[date_from, date_to]`. Summary rows lack most fields; each row is
//! completed with a detail request before it is stored.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{FieldKind, FieldMapping, parse_date_param, reject_unknown_params, store_candidate};
use crate::domain::{Agency, Cursor, EnforcementStore, RawParams, RawRecord, RecordType, ScrapeParams, Session};
use crate::scraping::error::{FetchFailure, InvalidParams, ProcessingError};
use crate::scraping::fetcher::{FetchRequest, RecordFetcher};
use crate::scraping::rate_limiter::ScrapeRateLimiter;
use crate::scraping::strategy::{ProcessedRecord, ScrapeStrategy, StrategyDeps};

const PARAMS: &[&str] = &["date_from", "date_to"];

const CASE_FIELDS: FieldMapping = FieldMapping {
    key_field: "record_id",
    fields: &[
        ("offender", "offender_name", FieldKind::Text),
        ("action_date", "action_date", FieldKind::Date),
        ("fine", "fine_amount", FieldKind::Amount),
        ("costs", "costs_amount", FieldKind::Amount),
        ("outcome", "result", FieldKind::Text),
        ("court", "court_name", FieldKind::Text),
        ("offence", "offence_description", FieldKind::Text),
        ("url", "regulator_url", FieldKind::Text),
        ("environmental_impact", "environmental_impact", FieldKind::Text),
    ],
};

const NOTICE_FIELDS: FieldMapping = FieldMapping {
    key_field: "record_id",
    fields: &[
        ("offender", "offender_name", FieldKind::Text),
        ("action_date", "action_date", FieldKind::Date),
        ("action_type", "notice_type", FieldKind::Text),
        ("compliance_date", "compliance_date", FieldKind::Date),
        ("offence", "offence_description", FieldKind::Text),
        ("url", "regulator_url", FieldKind::Text),
        ("environmental_impact", "environmental_impact", FieldKind::Text),
    ],
};

pub struct EnvironmentAgencyStrategy {
    record_type: RecordType,
    mapping: FieldMapping,
    fetcher: Arc<dyn RecordFetcher>,
    store: Arc<dyn EnforcementStore>,
    rate_limiter: Arc<ScrapeRateLimiter>,
}

impl EnvironmentAgencyStrategy {
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
            rate_limiter: deps.rate_limiter.clone(),
        }
    }

    /// Registry factory
    pub fn build(deps: &StrategyDeps, record_type: RecordType) -> Arc<dyn ScrapeStrategy> {
        Arc::new(Self::new(record_type, deps))
    }
}

#[async_trait]
impl ScrapeStrategy for EnvironmentAgencyStrategy {
    fn agency(&self) -> Agency {
        Agency::EnvironmentAgency
    }

    fn record_type(&self) -> RecordType {
        self.record_type
    }

    fn validate_params(&self, raw: &RawParams) -> Result<ScrapeParams, InvalidParams> {
        reject_unknown_params(raw, PARAMS)?;
        let date_from = parse_date_param(raw, "date_from")?;
        let date_to = parse_date_param(raw, "date_to")?;
        if date_from > date_to {
            return Err(InvalidParams(format!(
                "date_from ({date_from}) must not be after date_to ({date_to})"
            )));
        }
        Ok(ScrapeParams::DateRange { date_from, date_to })
    }

    fn next_cursor(&self, params: &ScrapeParams, previous: Option<&Cursor>) -> Option<Cursor> {
        match (params, previous) {
            (ScrapeParams::DateRange { date_from, date_to }, None) => Some(Cursor::DateRange {
                from: *date_from,
                to: *date_to,
            }),
            _ => None,
        }
    }

    async fn fetch(&self, _params: &ScrapeParams, cursor: &Cursor) -> Result<Vec<RawRecord>, FetchFailure> {
        self.fetcher
            .fetch(&FetchRequest {
                agency: Agency::EnvironmentAgency,
                record_type: self.record_type,
                cursor: cursor.clone(),
            })
            .await
    }

    async fn process_one(&self, mut record: RawRecord, session: &Session) -> Result<ProcessedRecord, ProcessingError> {
        let regulator_id = self.mapping.regulator_id(&record).ok_or_else(|| {
            ProcessingError::InvalidRecord(format!("missing natural key field '{}'", self.mapping.key_field))
        })?;

        let detail = self
            .rate_limiter
            .guarded(
                Agency::EnvironmentAgency,
                &session.limits,
                self.fetcher
                    .fetch_detail(Agency::EnvironmentAgency, self.record_type, &regulator_id),
            )
            .await?;
        match detail {
            Some(detail) => record.merge(detail),
            None => debug!(%regulator_id, "No detail available, using summary row"),
        }

        let candidate = self
            .mapping
            .to_candidate(Agency::EnvironmentAgency, self.record_type, &record)?;
        store_candidate(self.store.as_ref(), &candidate).await
    }

    fn progress_percentage(&self, session: &Session) -> f64 {
        if session.pages_processed > 0 {
            100.0
        } else {
            0.0
        }
    }
}
