//! Repository interfaces for the scraping engine
//!
//! Contains trait definitions for the persistence collaborators. Storage
//! layout is entirely up to the implementations in the infrastructure layer.

use async_trait::async_trait;
use thiserror::Error;

use super::enforcement::{AttributeMap, CandidateRecord, EnforcementRecord, NaturalKey};
use super::processing_log::ProcessingLog;
use super::session::Session;

/// Failure reported by a persistence collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Natural-key collision on create. Routed into the update decision.
    #[error("Duplicate natural key")]
    DuplicateKey,

    #[error("Record not found")]
    NotFound,

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::DuplicateKey,
            sqlx::Error::RowNotFound => Self::NotFound,
            _ => Self::Backend(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Storage of enforcement records keyed by natural key
#[async_trait]
pub trait EnforcementStore: Send + Sync {
    /// Inserts a new record. Must fail with [`StoreError::DuplicateKey`]
    /// when the natural key already exists.
    async fn create(&self, candidate: &CandidateRecord) -> Result<EnforcementRecord, StoreError>;

    /// Writes only `changes` onto the stored record; other attributes survive.
    async fn update(
        &self,
        record: &EnforcementRecord,
        changes: &AttributeMap,
    ) -> Result<EnforcementRecord, StoreError>;

    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Option<EnforcementRecord>, StoreError>;
}

/// Durable home of session snapshots
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts or replaces the snapshot for `session.session_id`.
    async fn save(&self, session: &Session) -> Result<(), StoreError>;

    async fn get(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    async fn list(&self) -> Result<Vec<Session>, StoreError>;
}

/// Append-only storage for per-batch audit rows
#[async_trait]
pub trait ProcessingLogStore: Send + Sync {
    async fn append(&self, log: &ProcessingLog) -> Result<(), StoreError>;

    /// Rows for one session in batch order.
    async fn for_session(&self, session_id: &str) -> Result<Vec<ProcessingLog>, StoreError>;
}
