//! Scraping session state
//!
//! A [`Session`] is the durable record of one run. It is only ever changed
//! through [`Session::apply`], which takes the current state plus a
//! [`SessionDelta`] and returns the next state. Illegal deltas are rejected
//! and leave the previous state untouched, so every invariant below holds for
//! any value observers can see:
//!
//! - status moves `Pending → Running → {Completed, Failed, Stopped}` only
//! - counters never decrease
//! - the cursor only advances
//! - `found == created + updated + existing + errors`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::agency::{Agency, RecordType};
use super::params::{Cursor, ScrapeParams};

pub type SessionId = String;

/// Current status of a scraping session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl SessionStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of processing one fetched record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Created,
    Updated,
    Existing,
    Error,
}

impl RecordOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Existing => "existing",
            Self::Error => "error",
        }
    }
}

/// Why a run ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// An external stop request was observed
    Cancelled,
    /// `max_pages_per_run` batches were processed
    PageLimitReached,
    /// Consecutive fetch failures reached `max_consecutive_errors`
    ErrorThresholdReached,
    /// The source returned an empty batch
    SourceExhausted,
    /// Known records were reached; older data is assumed to be stored already
    DuplicatesExhausted,
    /// The strategy has no further unit to fetch
    EndOfRange,
    /// The worker terminated abnormally
    WorkerAborted,
}

/// Per-record counters; all monotonically non-decreasing
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordCounters {
    pub found: u32,
    pub created: u32,
    pub updated: u32,
    pub existing: u32,
    pub errors: u32,
}

impl RecordCounters {
    /// `found == created + updated + existing + errors`
    #[must_use]
    pub const fn is_balanced(&self) -> bool {
        self.found == self.created + self.updated + self.existing + self.errors
    }

    const fn record(mut self, outcome: RecordOutcome) -> Self {
        self.found += 1;
        match outcome {
            RecordOutcome::Created => self.created += 1,
            RecordOutcome::Updated => self.updated += 1,
            RecordOutcome::Existing => self.existing += 1,
            RecordOutcome::Error => self.errors += 1,
        }
        self
    }
}

/// Limits and pacing applied to one run, snapshotted at session creation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunLimits {
    pub max_pages_per_run: u32,
    pub max_consecutive_errors: u32,
    pub consecutive_existing_threshold: u32,
    pub requests_per_minute: u32,
    pub pause_between_pages_ms: u64,
    pub network_timeout_ms: u64,
}

/// A single state change. See [`Session::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionDelta {
    Start,
    UnitStarted(Cursor),
    RecordProcessed(RecordOutcome),
    BatchCompleted,
    FetchFailed(String),
    Progress(f64),
    Finish {
        status: SessionStatus,
        reason: StopReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionTransitionError {
    #[error("Cannot move session from {from} to {to}")]
    IllegalTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Session is {status}, expected running")]
    NotRunning { status: SessionStatus },

    #[error("Cursor {next} does not advance from {previous}")]
    CursorRegression { previous: Cursor, next: Cursor },
}

/// One scraping run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: SessionId,
    pub agency: Agency,
    pub record_type: RecordType,
    /// Who started the run
    pub actor: String,
    pub status: SessionStatus,
    pub cursor: Option<Cursor>,
    pub pages_processed: u32,
    pub counters: RecordCounters,
    /// Batch-level fetch failures over the whole run
    pub errors_count: u32,
    /// Fetch failures since the last successful batch
    pub consecutive_errors: u32,
    /// `existing` outcomes since the last created/updated record
    pub consecutive_existing: u32,
    pub progress_percent: f64,
    pub params: ScrapeParams,
    pub limits: RunLimits,
    pub last_error: Option<String>,
    pub stop_reason: Option<StopReason>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates a pending session with zeroed counters.
    #[must_use]
    pub fn new(
        agency: Agency,
        record_type: RecordType,
        actor: impl Into<String>,
        params: ScrapeParams,
        limits: RunLimits,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            agency,
            record_type,
            actor: actor.into(),
            status: SessionStatus::Pending,
            cursor: None,
            pages_processed: 0,
            counters: RecordCounters::default(),
            errors_count: 0,
            consecutive_errors: 0,
            consecutive_existing: 0,
            progress_percent: 0.0,
            params,
            limits,
            last_error: None,
            stop_reason: None,
            created_at: now,
            started_at: None,
            ended_at: None,
            last_updated_at: now,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Returns the state that results from applying `delta` to `self`.
    pub fn apply(&self, delta: SessionDelta) -> Result<Self, SessionTransitionError> {
        let mut next = self.clone();
        let now = Utc::now();
        next.last_updated_at = now;

        match delta {
            SessionDelta::Start => {
                if self.status != SessionStatus::Pending {
                    return Err(SessionTransitionError::IllegalTransition {
                        from: self.status,
                        to: SessionStatus::Running,
                    });
                }
                next.status = SessionStatus::Running;
                next.started_at = Some(now);
            }
            SessionDelta::UnitStarted(cursor) => {
                self.ensure_running()?;
                if let Some(previous) = &self.cursor {
                    if !cursor.advances_from(previous) {
                        return Err(SessionTransitionError::CursorRegression {
                            previous: previous.clone(),
                            next: cursor,
                        });
                    }
                }
                next.cursor = Some(cursor);
            }
            SessionDelta::RecordProcessed(outcome) => {
                self.ensure_running()?;
                next.counters = self.counters.record(outcome);
                next.consecutive_existing = match outcome {
                    RecordOutcome::Existing => self.consecutive_existing + 1,
                    RecordOutcome::Created | RecordOutcome::Updated => 0,
                    RecordOutcome::Error => self.consecutive_existing,
                };
            }
            SessionDelta::BatchCompleted => {
                self.ensure_running()?;
                next.pages_processed += 1;
                next.consecutive_errors = 0;
            }
            SessionDelta::FetchFailed(reason) => {
                self.ensure_running()?;
                next.errors_count += 1;
                next.consecutive_errors += 1;
                next.last_error = Some(reason);
            }
            SessionDelta::Progress(percent) => {
                self.ensure_running()?;
                next.progress_percent = if percent.is_finite() {
                    percent.clamp(0.0, 100.0)
                } else {
                    self.progress_percent
                };
            }
            SessionDelta::Finish { status, reason } => {
                if self.status != SessionStatus::Running || !status.is_terminal() {
                    return Err(SessionTransitionError::IllegalTransition {
                        from: self.status,
                        to: status,
                    });
                }
                next.status = status;
                next.stop_reason = Some(reason);
                next.ended_at = Some(now);
                if status == SessionStatus::Completed {
                    next.progress_percent = 100.0;
                }
            }
        }

        Ok(next)
    }

    const fn ensure_running(&self) -> Result<(), SessionTransitionError> {
        if matches!(self.status, SessionStatus::Running) {
            Ok(())
        } else {
            Err(SessionTransitionError::NotRunning {
                status: self.status,
            })
        }
    }
}
