//! Domain module - Core value types of the scraping engine
//!
//! This module contains the session state machine, run parameters,
//! enforcement record values and the per-batch audit log.

pub mod agency;
pub mod enforcement;
pub mod params;
pub mod processing_log;
pub mod repositories;
pub mod session;

// Re-export commonly used items
pub use agency::{Agency, RecordType, UnknownIdentifier};
pub use enforcement::{AttributeMap, CandidateRecord, EnforcementRecord, NaturalKey, RawRecord};
pub use params::{Cursor, RawParams, ScrapeParams};
pub use processing_log::{BatchTally, ItemSummary, ProcessingLog};
pub use repositories::{EnforcementStore, ProcessingLogStore, SessionStore, StoreError};
pub use session::{
    RecordCounters, RecordOutcome, RunLimits, Session, SessionDelta, SessionId, SessionStatus,
    SessionTransitionError, StopReason,
};
