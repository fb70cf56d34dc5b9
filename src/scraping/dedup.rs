//! Create / update / skip decision for one candidate record
//!
//! Every strategy funnels its records through [`persist_candidate`]. The
//! coordinator's duplicate-exhaustion stop condition counts the outcomes it
//! returns.

use serde_json::Value;
use tracing::debug;

use super::error::ProcessingError;
use crate::domain::{AttributeMap, CandidateRecord, EnforcementStore, RecordOutcome, RecordType, StoreError};

/// Whitelisted fields whose candidate value differs from the stored one.
///
/// Fields missing from the candidate are left alone: a feed omitting a value
/// is not evidence that the value was removed.
#[must_use]
pub fn changed_fields(record_type: RecordType, stored: &AttributeMap, candidate: &AttributeMap) -> AttributeMap {
    record_type
        .comparable_fields()
        .iter()
        .filter_map(|&field| {
            let new_value = candidate.get(field).filter(|v| !v.is_null())?;
            match stored.get(field) {
                Some(old_value) if values_equal(old_value, new_value) => None,
                _ => Some((field.to_string(), new_value.clone())),
            }
        })
        .collect()
}

/// JSON equality that treats `1500` and `1500.0` as the same amount.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Stores `candidate`, deciding between create, scoped update and no-op.
pub async fn persist_candidate(
    store: &dyn EnforcementStore,
    candidate: &CandidateRecord,
) -> Result<RecordOutcome, ProcessingError> {
    match store.create(candidate).await {
        Ok(record) => {
            debug!(key = %candidate.key, id = %record.id, "Created record");
            Ok(RecordOutcome::Created)
        }
        Err(StoreError::DuplicateKey) => {
            let stored = store
                .find_by_natural_key(&candidate.key)
                .await?
                .ok_or(StoreError::NotFound)?;

            let changes = changed_fields(candidate.key.record_type, &stored.attrs, &candidate.attrs);
            if changes.is_empty() {
                debug!(key = %candidate.key, "Record unchanged, skipping write");
                return Ok(RecordOutcome::Existing);
            }

            debug!(
                key = %candidate.key,
                fields = ?changes.keys().collect::<Vec<_>>(),
                "Updating changed fields"
            );
            store.update(&stored, &changes).await?;
            Ok(RecordOutcome::Updated)
        }
        Err(other) => Err(other.into()),
    }
}
