//! Test utilities for the scraping engine
//!
//! Provides a scripted fetch collaborator and a fully wired coordinator over
//! in-memory stores so unit tests never touch the network.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::{Agency, Cursor, RawParams, RawRecord, RecordType};
use crate::infrastructure::config::{ScraperConfig, StaticConfigProvider};
use crate::infrastructure::{InMemoryEnforcementStore, InMemoryProcessingLogStore, InMemorySessionStore};
use crate::scraping::{
    FetchFailure, FetchRequest, RecordFetcher, RecordingEventSink, ScrapeCoordinator, ScrapeRateLimiter,
    StrategyDeps, StrategyRegistry,
};

/// Fetcher answering from a script keyed by cursor
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    pages: HashMap<u32, Result<Vec<Value>, FetchFailure>>,
    range: Option<Result<Vec<Value>, FetchFailure>>,
    details: HashMap<String, Result<Value, FetchFailure>>,
    always_fail: Option<FetchFailure>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    #[must_use]
    pub fn with_page(mut self, page: u32, rows: Vec<Value>) -> Self {
        self.pages.insert(page, Ok(rows));
        self
    }

    #[must_use]
    pub fn with_page_failure(mut self, page: u32, failure: FetchFailure) -> Self {
        self.pages.insert(page, Err(failure));
        self
    }

    /// Rows for any date-range cursor
    #[must_use]
    pub fn with_range(mut self, rows: Vec<Value>) -> Self {
        self.range = Some(Ok(rows));
        self
    }

    #[must_use]
    pub fn with_detail(mut self, regulator_id: &str, detail: Value) -> Self {
        self.details.insert(regulator_id.to_string(), Ok(detail));
        self
    }

    #[must_use]
    pub fn with_detail_failure(mut self, regulator_id: &str, failure: FetchFailure) -> Self {
        self.details.insert(regulator_id.to_string(), Err(failure));
        self
    }

    #[must_use]
    pub fn always_failing(failure: FetchFailure) -> Self {
        Self {
            always_fail: Some(failure),
            ..Self::default()
        }
    }

    /// Sleeps before answering each list fetch
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// List fetches served so far
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn to_records(rows: &[Value]) -> Vec<RawRecord> {
    rows.iter().cloned().map(RawRecord::from).collect()
}

#[async_trait]
impl RecordFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawRecord>, FetchFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = &self.always_fail {
            return Err(failure.clone());
        }
        let scripted = match &request.cursor {
            Cursor::Page { page } => self.pages.get(page),
            Cursor::DateRange { .. } => self.range.as_ref(),
        };
        match scripted {
            Some(Ok(rows)) => Ok(to_records(rows)),
            Some(Err(failure)) => Err(failure.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_detail(
        &self,
        _agency: Agency,
        _record_type: RecordType,
        regulator_id: &str,
    ) -> Result<Option<RawRecord>, FetchFailure> {
        match self.details.get(regulator_id) {
            Some(Ok(detail)) => Ok(Some(RawRecord::from(detail.clone()))),
            Some(Err(failure)) => Err(failure.clone()),
            None => Ok(None),
        }
    }
}

/// HSE case rows `"{prefix}-1"..="{prefix}-{count}"`
#[must_use]
pub fn hse_case_rows(prefix: &str, count: usize) -> Vec<Value> {
    (1..=count)
        .map(|i| {
            json!({
                "case_reference": format!("{prefix}-{i}"),
                "offender_name": format!("Company {prefix} {i}"),
                "hearing_date": "2024-03-01",
                "fine": 1000 * i,
            })
        })
        .collect()
}

#[must_use]
pub fn raw_params(pairs: &[(&str, &str)]) -> RawParams {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Configuration without pauses so tests run at full speed
#[must_use]
pub fn fast_config() -> ScraperConfig {
    ScraperConfig {
        requests_per_minute: 60_000,
        pause_between_pages_ms: 0,
        network_timeout_ms: 2_000,
        ..ScraperConfig::default()
    }
}

/// Coordinator wired to a scripted fetcher and in-memory stores
pub struct TestContext {
    pub coordinator: ScrapeCoordinator,
    pub fetcher: Arc<ScriptedFetcher>,
    pub records: Arc<InMemoryEnforcementStore>,
    pub events: Arc<RecordingEventSink>,
}

impl TestContext {
    pub fn new(fetcher: ScriptedFetcher, config: ScraperConfig) -> Self {
        let fetcher = Arc::new(fetcher);
        let records = Arc::new(InMemoryEnforcementStore::new());
        let events = Arc::new(RecordingEventSink::new());
        let rate_limiter = Arc::new(ScrapeRateLimiter::new());
        let registry = StrategyRegistry::new(&StrategyDeps {
            fetcher: fetcher.clone(),
            store: records.clone(),
            rate_limiter: rate_limiter.clone(),
        });
        let coordinator = ScrapeCoordinator::new(
            registry,
            Arc::new(StaticConfigProvider::new(config)),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryProcessingLogStore::new()),
            events.clone(),
            rate_limiter,
        );
        Self {
            coordinator,
            fetcher,
            records,
            events,
        }
    }
}
