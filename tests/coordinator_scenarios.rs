//! End-to-end runs through the public coordinator API with a fake feed

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use enforcement_scraper::domain::{
    Agency, Cursor, EnforcementStore, NaturalKey, ProcessingLogStore, RawParams, RawRecord, RecordType, Session,
    SessionStatus, SessionStore, StopReason,
};
use enforcement_scraper::infrastructure::{
    DatabaseConnection, InMemoryEnforcementStore, InMemoryProcessingLogStore, InMemorySessionStore, ScraperConfig,
    SqliteEnforcementStore, SqliteProcessingLogStore, SqliteSessionStore, StaticConfigProvider,
};
use enforcement_scraper::scraping::{
    FetchFailure, FetchRequest, NoopEventSink, RecordFetcher, ScrapeCoordinator, ScrapeError, ScrapeRateLimiter,
    StrategyDeps, StrategyRegistry,
};

/// Feed whose pages can be rewritten between runs
#[derive(Default)]
struct FakeFeed {
    pages: Mutex<HashMap<u32, Vec<Value>>>,
    failing_pages: HashSet<u32>,
    range: Vec<Value>,
    details: HashMap<String, Value>,
    delay: Option<Duration>,
}

impl FakeFeed {
    fn with_page(self, page: u32, rows: Vec<Value>) -> Self {
        self.set_page(page, rows);
        self
    }

    fn set_page(&self, page: u32, rows: Vec<Value>) {
        self.pages.lock().unwrap().insert(page, rows);
    }
}

#[async_trait]
impl RecordFetcher for FakeFeed {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawRecord>, FetchFailure> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let rows = match &request.cursor {
            Cursor::Page { page } if self.failing_pages.contains(page) => {
                return Err(FetchFailure::Http { status: 500 });
            }
            Cursor::Page { page } => self.pages.lock().unwrap().get(page).cloned().unwrap_or_default(),
            Cursor::DateRange { .. } => self.range.clone(),
        };
        Ok(rows.into_iter().map(RawRecord::from).collect())
    }

    async fn fetch_detail(
        &self,
        _agency: Agency,
        _record_type: RecordType,
        regulator_id: &str,
    ) -> Result<Option<RawRecord>, FetchFailure> {
        Ok(self.details.get(regulator_id).cloned().map(RawRecord::from))
    }
}

fn case_rows(prefix: &str, count: usize) -> Vec<Value> {
    (1..=count)
        .map(|i| {
            json!({
                "case_reference": format!("{prefix}{i}"),
                "offender_name": format!("{prefix} Construction {i} Ltd"),
                "hearing_date": "2024-05-14",
                "fine": "£12,000",
            })
        })
        .collect()
}

fn params(pairs: &[(&str, &str)]) -> RawParams {
    pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}

fn config(max_pages: u32) -> ScraperConfig {
    ScraperConfig {
        max_pages_per_run: max_pages,
        requests_per_minute: 60_000,
        pause_between_pages_ms: 0,
        network_timeout_ms: 2_000,
        ..ScraperConfig::default()
    }
}

struct Harness {
    coordinator: ScrapeCoordinator,
    feed: Arc<FakeFeed>,
    records: Arc<dyn EnforcementStore>,
    sessions: Arc<dyn SessionStore>,
}

impl Harness {
    fn in_memory(feed: FakeFeed, config: ScraperConfig) -> Self {
        Self::with_stores(
            feed,
            config,
            Arc::new(InMemoryEnforcementStore::new()),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryProcessingLogStore::new()),
        )
    }

    fn with_stores(
        feed: FakeFeed,
        config: ScraperConfig,
        records: Arc<dyn EnforcementStore>,
        sessions: Arc<dyn SessionStore>,
        logs: Arc<dyn ProcessingLogStore>,
    ) -> Self {
        let feed = Arc::new(feed);
        let rate_limiter = Arc::new(ScrapeRateLimiter::new());
        let registry = StrategyRegistry::new(&StrategyDeps {
            fetcher: feed.clone(),
            store: records.clone(),
            rate_limiter: rate_limiter.clone(),
        });
        let coordinator = ScrapeCoordinator::new(
            registry,
            Arc::new(StaticConfigProvider::new(config)),
            sessions.clone(),
            logs,
            Arc::new(NoopEventSink),
            rate_limiter,
        );
        Self {
            coordinator,
            feed,
            records,
            sessions,
        }
    }

    async fn run_hse_cases(&self, pairs: &[(&str, &str)]) -> Session {
        self.coordinator
            .run_session(Agency::Hse, RecordType::Case, params(pairs), "integration")
            .await
            .unwrap()
    }
}

fn assert_accounting(session: &Session) {
    let c = &session.counters;
    assert_eq!(c.found, c.created + c.updated + c.existing + c.errors, "{c:?}");
}

#[tokio::test]
async fn two_pages_of_new_records_hit_the_page_limit() {
    let feed = FakeFeed::default()
        .with_page(1, case_rows("A", 3))
        .with_page(2, case_rows("B", 3))
        .with_page(3, case_rows("C", 3));
    let h = Harness::in_memory(feed, config(2));

    let session = h.run_hse_cases(&[("start_page", "1")]).await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.stop_reason, Some(StopReason::PageLimitReached));
    assert_eq!(session.pages_processed, 2);
    assert_eq!(session.counters.found, 6);
    assert_eq!(session.counters.created, 6);
    assert_accounting(&session);

    let logs = h.coordinator.processing_logs(&session.session_id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|log| log.tally.created == 3));
}

#[tokio::test]
async fn a_page_of_known_records_ends_the_run() {
    let feed = FakeFeed::default()
        .with_page(1, case_rows("NEW", 3))
        .with_page(2, case_rows("OLD", 3))
        .with_page(3, case_rows("OLDER", 3));
    let h = Harness::in_memory(feed, config(10));

    let seeded = h.run_hse_cases(&[("start_page", "2"), ("end_page", "2")]).await;
    assert_eq!(seeded.counters.created, 3);

    let session = h.run_hse_cases(&[("start_page", "1")]).await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.stop_reason, Some(StopReason::DuplicatesExhausted));
    assert_eq!(session.counters.created, 3);
    assert_eq!(session.counters.existing, 3);
    assert_eq!(session.pages_processed, 2);
    assert_accounting(&session);
}

#[tokio::test]
async fn rerunning_unchanged_data_writes_nothing() {
    let feed = FakeFeed::default().with_page(1, case_rows("A", 4));
    let h = Harness::in_memory(feed, config(10));

    let first = h.run_hse_cases(&[]).await;
    assert_eq!(first.counters.created, 4);

    let second = h.run_hse_cases(&[]).await;
    assert_eq!(second.counters.created, 0);
    assert_eq!(second.counters.updated, 0);
    assert_eq!(second.counters.existing, 4);
    assert_eq!(second.stop_reason, Some(StopReason::DuplicatesExhausted));
}

#[tokio::test]
async fn changed_fields_update_the_stored_record() {
    let feed = FakeFeed::default().with_page(1, case_rows("A", 2));
    let h = Harness::in_memory(feed, config(10));
    h.run_hse_cases(&[]).await;

    let mut rows = case_rows("A", 2);
    rows[0]["fine"] = json!("£40,000");
    h.feed.set_page(1, rows);

    let session = h.run_hse_cases(&[]).await;
    assert_eq!(session.counters.updated, 1);
    assert_eq!(session.counters.existing, 1);

    let stored = h
        .records
        .find_by_natural_key(&NaturalKey::new(Agency::Hse, RecordType::Case, "A1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.attrs.get("fine_amount"), Some(&json!(40_000)));
    assert_eq!(stored.attrs.get("offender_name"), Some(&json!("A Construction 1 Ltd")));
}

#[tokio::test]
async fn an_empty_first_page_exhausts_the_source() {
    let h = Harness::in_memory(FakeFeed::default(), config(10));

    let session = h.run_hse_cases(&[]).await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.stop_reason, Some(StopReason::SourceExhausted));
    assert_eq!(session.counters.found, 0);
}

#[tokio::test]
async fn repeated_failures_stop_at_the_error_threshold() {
    let feed = FakeFeed {
        failing_pages: (1..=10).collect(),
        ..FakeFeed::default()
    };
    let cfg = ScraperConfig {
        max_consecutive_errors: 2,
        ..config(10)
    };
    let h = Harness::in_memory(feed, cfg);

    let session = h.run_hse_cases(&[]).await;

    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.stop_reason, Some(StopReason::ErrorThresholdReached));
    assert_eq!(session.errors_count, 2);
    assert!(session.last_error.is_some());
}

#[tokio::test]
async fn stopping_a_background_run_leaves_it_stopped() {
    let feed = FakeFeed {
        delay: Some(Duration::from_millis(50)),
        ..FakeFeed::default()
    };
    for page in 1..=50 {
        feed.set_page(page, case_rows(&format!("P{page}-"), 2));
    }
    let h = Harness::in_memory(feed, config(50));

    let session_id = h
        .coordinator
        .start_session(Agency::Hse, RecordType::Case, params(&[]), "integration")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(h.coordinator.stop_session(&session_id).await.unwrap());

    let mut session = h.coordinator.session(&session_id).await.unwrap();
    for _ in 0..300 {
        if session.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        session = h.coordinator.session(&session_id).await.unwrap();
    }

    assert_eq!(session.status, SessionStatus::Stopped);
    assert_eq!(session.stop_reason, Some(StopReason::Cancelled));
    assert!(session.pages_processed < 50);
    assert_accounting(&session);
}

#[tokio::test]
async fn unknown_strategy_and_bad_params_are_rejected_up_front() {
    let h = Harness::in_memory(FakeFeed::default(), config(10));

    let empty = ScrapeCoordinator::new(
        StrategyRegistry::empty(),
        Arc::new(StaticConfigProvider::new(config(10))),
        h.sessions.clone(),
        Arc::new(InMemoryProcessingLogStore::new()),
        Arc::new(NoopEventSink),
        Arc::new(ScrapeRateLimiter::new()),
    );
    let err = empty
        .start_session(Agency::Hse, RecordType::Case, params(&[]), "integration")
        .await
        .unwrap_err();
    assert!(matches!(err, ScrapeError::StrategyNotFound { .. }));

    let err = h
        .coordinator
        .start_session(Agency::EnvironmentAgency, RecordType::Case, params(&[("date_from", "2024-01-01")]), "integration")
        .await
        .unwrap_err();
    assert!(matches!(err, ScrapeError::InvalidParams(_)));

    let err = h
        .coordinator
        .start_session(Agency::Hse, RecordType::Notice, params(&[("page_size", "50")]), "integration")
        .await
        .unwrap_err();
    assert!(matches!(err, ScrapeError::InvalidParams(_)));

    assert!(h.sessions.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn environment_agency_runs_one_date_range_with_details() {
    let feed = FakeFeed {
        range: vec![
            json!({"record_id": "EA-1", "offender": "River Polluters plc", "action_date": "2024-02-03"}),
            json!({"record_id": "EA-2", "offender": "Waste Carriers Ltd", "action_date": "2024-02-10"}),
        ],
        details: HashMap::from([(
            "EA-1".to_string(),
            json!({"fine": 25000, "environmental_impact": "Major", "court": "Leeds Crown Court"}),
        )]),
        ..FakeFeed::default()
    };
    let h = Harness::in_memory(feed, config(10));

    let session = h
        .coordinator
        .run_session(
            Agency::EnvironmentAgency,
            RecordType::Case,
            params(&[("date_from", "2024-02-01"), ("date_to", "2024-02-29")]),
            "integration",
        )
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.stop_reason, Some(StopReason::EndOfRange));
    assert_eq!(session.pages_processed, 1);
    assert_eq!(session.counters.created, 2);

    let enriched = h
        .records
        .find_by_natural_key(&NaturalKey::new(Agency::EnvironmentAgency, RecordType::Case, "EA-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(enriched.attrs.get("environmental_impact"), Some(&json!("Major")));
    assert_eq!(enriched.attrs.get("fine_amount"), Some(&json!(25_000)));
}

#[tokio::test]
async fn sqlite_backed_run_persists_records_sessions_and_logs() {
    let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
    db.migrate().await.unwrap();
    let pool = db.pool().clone();

    let feed = FakeFeed::default()
        .with_page(1, case_rows("S", 2))
        .with_page(2, case_rows("T", 1));
    let h = Harness::with_stores(
        feed,
        config(10),
        Arc::new(SqliteEnforcementStore::new(pool.clone())),
        Arc::new(SqliteSessionStore::new(pool.clone())),
        Arc::new(SqliteProcessingLogStore::new(pool)),
    );

    let session = h.run_hse_cases(&[]).await;
    assert_eq!(session.counters.created, 3);
    assert_eq!(session.stop_reason, Some(StopReason::SourceExhausted));

    let stored = h.sessions.get(&session.session_id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.counters, session.counters);

    let logs = h.coordinator.processing_logs(&session.session_id).await.unwrap();
    assert_eq!(logs.iter().map(|l| l.batch_number).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(logs.iter().map(|l| l.tally.found).sum::<u32>(), session.counters.found);

    let again = h.run_hse_cases(&[]).await;
    assert_eq!(again.counters.existing, 2);
    assert_eq!(again.stop_reason, Some(StopReason::DuplicatesExhausted));
}
