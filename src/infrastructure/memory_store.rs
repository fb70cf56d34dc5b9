//! Memory-based enforcement record and processing log storage
//!
//! Same contracts as the SQLite stores, without a database. Used for dry runs
//! and throughout the test suite.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

use crate::domain::{
    AttributeMap, CandidateRecord, EnforcementRecord, EnforcementStore, NaturalKey, ProcessingLog,
    ProcessingLogStore, StoreError,
};

#[derive(Debug, Default)]
pub struct InMemoryEnforcementStore {
    records: Arc<RwLock<HashMap<NaturalKey, EnforcementRecord>>>,
    updates: AtomicUsize,
    injected_failure: Mutex<Option<StoreError>>,
}

impl InMemoryEnforcementStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `update` calls so far
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Makes the next `create` fail with `error` instead of touching the map.
    pub fn fail_next_create(&self, error: StoreError) {
        *self
            .injected_failure
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(error);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn take_injected_failure(&self) -> Option<StoreError> {
        self.injected_failure
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl EnforcementStore for InMemoryEnforcementStore {
    async fn create(&self, candidate: &CandidateRecord) -> Result<EnforcementRecord, StoreError> {
        if let Some(error) = self.take_injected_failure() {
            return Err(error);
        }
        let mut records = self.records.write().await;
        if records.contains_key(&candidate.key) {
            return Err(StoreError::DuplicateKey);
        }
        let record = EnforcementRecord::from_candidate(candidate);
        records.insert(candidate.key.clone(), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        record: &EnforcementRecord,
        changes: &AttributeMap,
    ) -> Result<EnforcementRecord, StoreError> {
        let mut records = self.records.write().await;
        let stored = records.get_mut(&record.key).ok_or(StoreError::NotFound)?;
        *stored = stored.with_changes(changes);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(stored.clone())
    }

    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Option<EnforcementRecord>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProcessingLogStore {
    logs: Arc<RwLock<Vec<ProcessingLog>>>,
}

impl InMemoryProcessingLogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessingLogStore for InMemoryProcessingLogStore {
    async fn append(&self, log: &ProcessingLog) -> Result<(), StoreError> {
        self.logs.write().await.push(log.clone());
        Ok(())
    }

    async fn for_session(&self, session_id: &str) -> Result<Vec<ProcessingLog>, StoreError> {
        Ok(self
            .logs
            .read()
            .await
            .iter()
            .filter(|log| log.session_id == session_id)
            .cloned()
            .collect())
    }
}
