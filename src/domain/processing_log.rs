//! Per-batch audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::agency::{Agency, RecordType};
use super::enforcement::CandidateRecord;
use super::session::{RecordOutcome, SessionId};

/// Compact description of one processed item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemSummary {
    pub regulator_id: Option<String>,
    pub name: Option<String>,
    pub date: Option<String>,
    pub amount: Option<Value>,
    pub outcome: RecordOutcome,
    pub error: Option<String>,
}

impl ItemSummary {
    #[must_use]
    pub fn from_candidate(candidate: &CandidateRecord, outcome: RecordOutcome) -> Self {
        Self {
            regulator_id: Some(candidate.key.regulator_id.clone()),
            name: candidate.attr_str("offender_name").map(str::to_string),
            date: candidate.attr_str("action_date").map(str::to_string),
            amount: candidate.attrs.get("fine_amount").cloned(),
            outcome,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(regulator_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            regulator_id,
            name: None,
            date: None,
            amount: None,
            outcome: RecordOutcome::Error,
            error: Some(error.into()),
        }
    }
}

/// Outcome tallies for one batch
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchTally {
    pub found: u32,
    pub created: u32,
    pub updated: u32,
    pub existing: u32,
    pub failed: u32,
}

impl BatchTally {
    pub const fn record(&mut self, outcome: RecordOutcome) {
        self.found += 1;
        match outcome {
            RecordOutcome::Created => self.created += 1,
            RecordOutcome::Updated => self.updated += 1,
            RecordOutcome::Existing => self.existing += 1,
            RecordOutcome::Error => self.failed += 1,
        }
    }

    /// Non-empty batch in which every item was already stored unchanged
    #[must_use]
    pub const fn all_existing(&self) -> bool {
        self.found > 0 && self.existing == self.found
    }
}

/// Append-only audit row, one per processed batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingLog {
    pub id: Uuid,
    pub session_id: SessionId,
    pub agency: Agency,
    pub record_type: RecordType,
    pub batch_number: u32,
    pub tally: BatchTally,
    pub items: Vec<ItemSummary>,
    pub batch_errors: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ProcessingLog {
    #[must_use]
    pub fn new(
        session_id: SessionId,
        agency: Agency,
        record_type: RecordType,
        batch_number: u32,
        items: Vec<ItemSummary>,
        batch_errors: Vec<String>,
    ) -> Self {
        let mut tally = BatchTally::default();
        for item in &items {
            tally.record(item.outcome);
        }
        Self {
            id: Uuid::new_v4(),
            session_id,
            agency,
            record_type,
            batch_number,
            tally,
            items,
            batch_errors,
            created_at: Utc::now(),
        }
    }
}
