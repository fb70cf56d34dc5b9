//! Enforcement record value types
//!
//! The engine does not own the full enforcement schema. Records travel as a
//! natural key plus a flat attribute map; the persistence collaborator decides
//! how those attributes are laid out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::agency::{Agency, RecordType};

/// Attribute name → JSON value, ordered for stable diffs and storage
pub type AttributeMap = BTreeMap<String, Value>;

/// Fields compared when deciding whether a stored case has changed
pub const CASE_COMPARABLE_FIELDS: &[&str] = &[
    "offender_name",
    "action_date",
    "fine_amount",
    "costs_amount",
    "result",
    "court_name",
    "offence_description",
    "regulator_url",
];

/// Fields compared when deciding whether a stored notice has changed
pub const NOTICE_COMPARABLE_FIELDS: &[&str] = &[
    "offender_name",
    "action_date",
    "notice_type",
    "compliance_date",
    "offence_description",
    "regulator_url",
];

impl RecordType {
    /// Whitelist of feed-sourced fields that participate in change detection.
    #[must_use]
    pub const fn comparable_fields(self) -> &'static [&'static str] {
        match self {
            Self::Case => CASE_COMPARABLE_FIELDS,
            Self::Notice => NOTICE_COMPARABLE_FIELDS,
        }
    }
}

/// Regulator-assigned identity of a record, unique per agency and record type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
    pub agency: Agency,
    pub record_type: RecordType,
    pub regulator_id: String,
}

impl NaturalKey {
    pub fn new(agency: Agency, record_type: RecordType, regulator_id: impl Into<String>) -> Self {
        Self {
            agency,
            record_type,
            regulator_id: regulator_id.into(),
        }
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.agency, self.record_type, self.regulator_id)
    }
}

/// One row as returned by a fetch collaborator, before normalization
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    /// String view of a field; numbers are rendered, blanks are treated as absent.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Merges detail fields over the summary row; detail wins.
    pub fn merge(&mut self, detail: RawRecord) {
        for (key, value) in detail.0 {
            if !value.is_null() {
                self.0.insert(key, value);
            }
        }
    }
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

/// Normalized record ready for the duplicate/update decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateRecord {
    pub key: NaturalKey,
    pub attrs: AttributeMap,
}

impl CandidateRecord {
    #[must_use]
    pub fn new(key: NaturalKey) -> Self {
        Self {
            key,
            attrs: AttributeMap::new(),
        }
    }

    /// Sets an attribute unless the value is null.
    #[must_use]
    pub fn with_attr(mut self, name: &str, value: Option<Value>) -> Self {
        if let Some(value) = value.filter(|v| !v.is_null()) {
            self.attrs.insert(name.to_string(), value);
        }
        self
    }

    #[must_use]
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(Value::as_str)
    }
}

/// A stored enforcement record as returned by the persistence collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnforcementRecord {
    pub id: Uuid,
    pub key: NaturalKey,
    pub attrs: AttributeMap,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnforcementRecord {
    /// Builds a freshly stored record from a candidate.
    #[must_use]
    pub fn from_candidate(candidate: &CandidateRecord) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            key: candidate.key.clone(),
            attrs: candidate.attrs.clone(),
            inserted_at: now,
            updated_at: now,
        }
    }

    /// Copy with `changes` written over the attributes; nothing else moves
    /// except `updated_at`.
    #[must_use]
    pub fn with_changes(&self, changes: &AttributeMap) -> Self {
        let mut next = self.clone();
        next.attrs
            .extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));
        next.updated_at = Utc::now();
        next
    }
}
