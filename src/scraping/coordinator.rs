//! Run orchestration
//!
//! [`ScrapeCoordinator`] turns a start request into a running session and
//! drives it to a terminal status. One run is one sequential worker:
//!
//! ```text
//! validate → create session → loop {
//!     stop check → next cursor → rate-limited fetch →
//!     process each record (counter bump + save + event) →
//!     batch counters + processing log row
//! } → finalize
//! ```
//!
//! The worker is the only writer of its session. External stop requests go
//! through a per-session [`CancellationToken`] that the worker observes at
//! the next unit boundary, never mid-fetch.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::error::ScrapeError;
use super::events::{EventSink, ScrapeEvent};
use super::rate_limiter::ScrapeRateLimiter;
use super::registry::StrategyRegistry;
use super::strategy::ScrapeStrategy;
use crate::domain::{
    Agency, BatchTally, ItemSummary, ProcessingLog, ProcessingLogStore, RawParams, RecordOutcome, RecordType,
    RunLimits, Session, SessionDelta, SessionId, SessionStatus, SessionStore, StopReason,
};
use crate::infrastructure::config::{ConfigError, ConfigProvider, ScraperConfig};

/// Decides whether the run must end before the next unit.
///
/// `last_batch` is the tally of the batch completed just before this check,
/// or `None` when the previous unit failed to fetch or none ran yet.
#[must_use]
pub fn stop_condition(
    session: &Session,
    last_batch: Option<&BatchTally>,
    cancelled: bool,
) -> Option<(SessionStatus, StopReason)> {
    let limits = &session.limits;

    if cancelled {
        return Some((SessionStatus::Stopped, StopReason::Cancelled));
    }
    if session.consecutive_errors >= limits.max_consecutive_errors {
        return Some((SessionStatus::Failed, StopReason::ErrorThresholdReached));
    }
    if let Some(tally) = last_batch {
        if tally.found == 0 {
            return Some((SessionStatus::Completed, StopReason::SourceExhausted));
        }
        if tally.all_existing() {
            return Some((SessionStatus::Completed, StopReason::DuplicatesExhausted));
        }
    }
    if limits.consecutive_existing_threshold > 0
        && session.consecutive_existing >= limits.consecutive_existing_threshold
    {
        return Some((SessionStatus::Completed, StopReason::DuplicatesExhausted));
    }
    if session.pages_processed >= limits.max_pages_per_run {
        return Some((SessionStatus::Completed, StopReason::PageLimitReached));
    }
    None
}

/// Status for a run whose strategy ran out of units.
const fn end_of_range_status(session: &Session) -> SessionStatus {
    if session.pages_processed == 0 && session.errors_count > 0 {
        SessionStatus::Failed
    } else {
        SessionStatus::Completed
    }
}

#[derive(Clone)]
pub struct ScrapeCoordinator {
    registry: Arc<StrategyRegistry>,
    config: Arc<dyn ConfigProvider>,
    sessions: Arc<dyn SessionStore>,
    logs: Arc<dyn ProcessingLogStore>,
    events: Arc<dyn EventSink>,
    rate_limiter: Arc<ScrapeRateLimiter>,
    active: Arc<RwLock<HashMap<SessionId, CancellationToken>>>,
}

impl std::fmt::Debug for ScrapeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeCoordinator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ScrapeCoordinator {
    /// `rate_limiter` must be the instance the registry's strategies share.
    #[must_use]
    pub fn new(
        registry: StrategyRegistry,
        config: Arc<dyn ConfigProvider>,
        sessions: Arc<dyn SessionStore>,
        logs: Arc<dyn ProcessingLogStore>,
        events: Arc<dyn EventSink>,
        rate_limiter: Arc<ScrapeRateLimiter>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
            sessions,
            logs,
            events,
            rate_limiter,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Validates and creates a session, then runs it on a background worker.
    ///
    /// Returns as soon as the session is persisted as running. Progress is
    /// observable through the event sink and [`Self::session`].
    pub async fn start_session(
        &self,
        agency: Agency,
        record_type: RecordType,
        raw_params: RawParams,
        actor: &str,
    ) -> Result<SessionId, ScrapeError> {
        let (strategy, session) = self.prepare(agency, record_type, &raw_params, actor).await?;
        let session_id = session.session_id.clone();
        let token = self.register_active(&session_id).await;

        let span = info_span!("scrape_session", session_id = %session_id, %agency, %record_type);
        let worker = self.spawn_worker(strategy, session, token, span.clone());

        let this = self.clone();
        let supervised_id = session_id.clone();
        tokio::spawn(
            async move {
                if let Ok(session) = this.supervise(worker, &supervised_id).await {
                    debug!(status = %session.status, "Worker finished");
                }
            }
            .instrument(span),
        );

        Ok(session_id)
    }

    /// Like [`Self::start_session`] but waits for the run and returns the
    /// final session. The worker is supervised the same way.
    pub async fn run_session(
        &self,
        agency: Agency,
        record_type: RecordType,
        raw_params: RawParams,
        actor: &str,
    ) -> Result<Session, ScrapeError> {
        let (strategy, session) = self.prepare(agency, record_type, &raw_params, actor).await?;
        let session_id = session.session_id.clone();
        let token = self.register_active(&session_id).await;

        let span = info_span!("scrape_session", session_id = %session_id, %agency, %record_type);
        let worker = self.spawn_worker(strategy, session, token, span.clone());
        self.supervise(worker, &session_id).instrument(span).await
    }

    fn spawn_worker(
        &self,
        strategy: Arc<dyn ScrapeStrategy>,
        session: Session,
        token: CancellationToken,
        span: tracing::Span,
    ) -> JoinHandle<Result<Session, ScrapeError>> {
        let this = self.clone();
        tokio::spawn(async move { this.drive(strategy, session, token).await }.instrument(span))
    }

    /// Awaits a worker and finalizes its session as failed if it died first.
    async fn supervise(
        &self,
        worker: JoinHandle<Result<Session, ScrapeError>>,
        session_id: &str,
    ) -> Result<Session, ScrapeError> {
        let result = match worker.await {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(err)) => {
                error!(error = %err, "Worker stopped on an internal error");
                self.fail_stranded(session_id).await;
                Err(err)
            }
            Err(join_err) => {
                error!(error = %join_err, "Worker aborted");
                self.fail_stranded(session_id).await;
                Err(ScrapeError::WorkerAborted(join_err.to_string()))
            }
        };
        self.active.write().await.remove(session_id);
        result
    }

    /// Requests a cooperative stop. Returns `false` when the session exists
    /// but is no longer running.
    pub async fn stop_session(&self, session_id: &str) -> Result<bool, ScrapeError> {
        let token = self.active.read().await.get(session_id).cloned();
        let stored = self.sessions.get(session_id).await?;
        match (token, stored) {
            (Some(token), stored) if !stored.as_ref().is_some_and(|s| s.status.is_terminal()) => {
                info!(%session_id, "Stop requested");
                token.cancel();
                Ok(true)
            }
            (_, Some(_)) => Ok(false),
            (_, None) => Err(ScrapeError::SessionNotFound(session_id.to_string())),
        }
    }

    pub async fn session(&self, session_id: &str) -> Result<Session, ScrapeError> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or_else(|| ScrapeError::SessionNotFound(session_id.to_string()))
    }

    /// Ids of sessions whose worker has not finished yet.
    pub async fn active_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.active.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn processing_logs(&self, session_id: &str) -> Result<Vec<ProcessingLog>, ScrapeError> {
        Ok(self.logs.for_session(session_id).await?)
    }

    #[must_use]
    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    async fn prepare(
        &self,
        agency: Agency,
        record_type: RecordType,
        raw_params: &RawParams,
        actor: &str,
    ) -> Result<(Arc<dyn ScrapeStrategy>, Session), ScrapeError> {
        let strategy = self.registry.lookup(agency, record_type)?;
        let limits = self.load_limits().await;

        let params = strategy.validate_params(raw_params).map_err(|err| {
            warn!(%agency, %record_type, error = %err, "Rejected scrape parameters");
            ScrapeError::from(err)
        })?;

        let session = Session::new(agency, record_type, actor, params, limits).apply(SessionDelta::Start)?;
        self.sessions.save(&session).await?;
        info!(
            session_id = %session.session_id,
            %agency,
            %record_type,
            actor,
            "Created scraping session for {}",
            strategy.display_name()
        );
        self.events.emit(ScrapeEvent::SessionCreated(session.clone()));
        Ok((strategy, session))
    }

    async fn load_limits(&self) -> RunLimits {
        let config = match self.config.active_config().await {
            Ok(config) => config,
            Err(ConfigError::NotConfigured) => {
                warn!("No scraper configuration found, using defaults");
                ScraperConfig::default()
            }
            Err(err) => {
                warn!(error = %err, "Scraper configuration unusable, using defaults");
                ScraperConfig::default()
            }
        };
        config.sanitized().limits()
    }

    async fn register_active(&self, session_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.active
            .write()
            .await
            .insert(session_id.to_string(), token.clone());
        token
    }

    /// The worker loop. Only transition errors escape; everything the source
    /// or the stores do wrong is recorded on the session instead.
    async fn drive(
        &self,
        strategy: Arc<dyn ScrapeStrategy>,
        mut session: Session,
        token: CancellationToken,
    ) -> Result<Session, ScrapeError> {
        let mut last_batch: Option<BatchTally> = None;

        loop {
            if let Some((status, reason)) = stop_condition(&session, last_batch.as_ref(), token.is_cancelled()) {
                return self.finish(session, status, reason).await;
            }

            let Some(cursor) = strategy.next_cursor(&session.params, session.cursor.as_ref()) else {
                let status = end_of_range_status(&session);
                return self.finish(session, status, StopReason::EndOfRange).await;
            };

            session = session.apply(SessionDelta::UnitStarted(cursor.clone()))?;
            self.persist(&session).await;
            debug!(%cursor, "Fetching unit");

            let fetched = self
                .rate_limiter
                .guarded(
                    session.agency,
                    &session.limits,
                    strategy.fetch(&session.params, &cursor),
                )
                .await;

            let records = match fetched {
                Ok(records) => records,
                Err(failure) => {
                    warn!(%cursor, error = %failure, "Fetch failed");
                    session = session.apply(SessionDelta::FetchFailed(failure.to_string()))?;
                    self.persist(&session).await;
                    self.append_log(ProcessingLog::new(
                        session.session_id.clone(),
                        session.agency,
                        session.record_type,
                        cursor.batch_number(),
                        Vec::new(),
                        vec![failure.to_string()],
                    ))
                    .await;
                    last_batch = None;
                    continue;
                }
            };

            debug!(%cursor, count = records.len(), "Processing batch");
            let mut items = Vec::with_capacity(records.len());
            for record in records {
                let (outcome, summary) = match strategy.process_one(record, &session).await {
                    Ok(processed) => (processed.outcome, processed.summary),
                    Err(err) => {
                        warn!(%cursor, error = %err, "Record failed");
                        (RecordOutcome::Error, ItemSummary::failed(None, err.to_string()))
                    }
                };
                session = session.apply(SessionDelta::RecordProcessed(outcome))?;
                self.persist(&session).await;
                items.push(summary);
            }

            session = session.apply(SessionDelta::BatchCompleted)?;
            let percent = strategy.progress_percentage(&session);
            session = session.apply(SessionDelta::Progress(percent))?;
            self.persist(&session).await;

            let log = ProcessingLog::new(
                session.session_id.clone(),
                session.agency,
                session.record_type,
                cursor.batch_number(),
                items,
                Vec::new(),
            );
            info!(
                %cursor,
                found = log.tally.found,
                created = log.tally.created,
                updated = log.tally.updated,
                existing = log.tally.existing,
                failed = log.tally.failed,
                "Batch completed"
            );
            last_batch = Some(log.tally);
            self.append_log(log).await;
        }
    }

    async fn finish(&self, session: Session, status: SessionStatus, reason: StopReason) -> Result<Session, ScrapeError> {
        let session = session.apply(SessionDelta::Finish { status, reason })?;
        info!(
            status = %session.status,
            ?reason,
            pages = session.pages_processed,
            found = session.counters.found,
            created = session.counters.created,
            updated = session.counters.updated,
            existing = session.counters.existing,
            errors = session.counters.errors,
            "Scraping session finished"
        );
        self.persist(&session).await;
        self.active.write().await.remove(&session.session_id);
        Ok(session)
    }

    /// Marks a session failed after its worker died without finalizing it.
    async fn fail_stranded(&self, session_id: &str) {
        let stored = match self.sessions.get(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(err) => {
                error!(%session_id, error = %err, "Cannot load stranded session");
                return;
            }
        };
        if !stored.is_running() {
            return;
        }
        match stored.apply(SessionDelta::Finish {
            status: SessionStatus::Failed,
            reason: StopReason::WorkerAborted,
        }) {
            Ok(failed) => self.persist(&failed).await,
            Err(err) => error!(%session_id, error = %err, "Cannot finalize stranded session"),
        }
    }

    /// Saves and announces a snapshot. Store failures do not stop the run.
    async fn persist(&self, session: &Session) {
        if let Err(err) = self.sessions.save(session).await {
            warn!(session_id = %session.session_id, error = %err, "Failed to save session snapshot");
        }
        self.events.emit(ScrapeEvent::SessionUpdated(session.clone()));
    }

    async fn append_log(&self, log: ProcessingLog) {
        if let Err(err) = self.logs.append(&log).await {
            warn!(session_id = %log.session_id, batch = log.batch_number, error = %err, "Failed to write processing log");
        }
        self.events.emit(ScrapeEvent::ProcessingLogCreated(log));
    }
}
