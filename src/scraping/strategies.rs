//! Concrete strategies and the normalization they share
//!
//! Each agency module declares a [`FieldMapping`] from its feed's column
//! names onto the attribute names the comparable-field whitelists use, then
//! hands the resulting candidate to the shared dedup routine.

pub mod environment_agency;
pub mod hse;

use chrono::NaiveDate;
use serde_json::{Number, Value};

use super::dedup::persist_candidate;
use super::error::{InvalidParams, ProcessingError};
use super::strategy::ProcessedRecord;
use crate::domain::{Agency, CandidateRecord, EnforcementStore, ItemSummary, NaturalKey, RawParams, RawRecord, RecordType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// ISO or `dd/mm/yyyy`, stored as ISO
    Date,
    /// Number or currency string, stored as a JSON number
    Amount,
}

/// Feed column → attribute mapping for one (agency, record type)
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub key_field: &'static str,
    pub fields: &'static [(&'static str, &'static str, FieldKind)],
}

impl FieldMapping {
    #[must_use]
    pub fn regulator_id(&self, raw: &RawRecord) -> Option<String> {
        raw.get_str(self.key_field)
    }

    /// Builds a candidate; a row without a natural key is rejected.
    pub fn to_candidate(
        &self,
        agency: Agency,
        record_type: RecordType,
        raw: &RawRecord,
    ) -> Result<CandidateRecord, ProcessingError> {
        let regulator_id = self.regulator_id(raw).ok_or_else(|| {
            ProcessingError::InvalidRecord(format!("missing natural key field '{}'", self.key_field))
        })?;

        let candidate = self
            .fields
            .iter()
            .fold(
                CandidateRecord::new(NaturalKey::new(agency, record_type, regulator_id)),
                |candidate, &(source, target, kind)| {
                    let value = match kind {
                        FieldKind::Text => raw.get_str(source).map(Value::String),
                        FieldKind::Date => raw
                            .get_str(source)
                            .and_then(|s| normalize_date(&s))
                            .map(Value::String),
                        FieldKind::Amount => raw.get(source).and_then(normalize_amount),
                    };
                    candidate.with_attr(target, value)
                },
            );
        Ok(candidate)
    }
}

fn normalize_date(input: &str) -> Option<String> {
    ["%Y-%m-%d", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
}

fn normalize_amount(value: &Value) -> Option<Value> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };
    if amount.fract() == 0.0 && amount.abs() < 9.0e15 {
        #[allow(clippy::cast_possible_truncation)]
        let whole = amount as i64;
        return Some(Value::Number(Number::from(whole)));
    }
    Number::from_f64(amount).map(Value::Number)
}

/// Persists through the shared dedup routine and builds the audit summary.
pub async fn store_candidate(
    store: &dyn EnforcementStore,
    candidate: &CandidateRecord,
) -> Result<ProcessedRecord, ProcessingError> {
    let outcome = persist_candidate(store, candidate).await?;
    Ok(ProcessedRecord {
        outcome,
        summary: ItemSummary::from_candidate(candidate, outcome),
    })
}

pub fn reject_unknown_params(raw: &RawParams, allowed: &[&str]) -> Result<(), InvalidParams> {
    match raw.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(InvalidParams(format!(
            "unknown parameter '{key}' (expected one of: {})",
            allowed.join(", ")
        ))),
        None => Ok(()),
    }
}

pub fn parse_page_param(raw: &RawParams, name: &str) -> Result<Option<u32>, InvalidParams> {
    raw.get(name)
        .map(|value| {
            value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|page| *page >= 1)
                .ok_or_else(|| InvalidParams(format!("{name} must be a positive integer, got '{value}'")))
        })
        .transpose()
}

pub fn parse_date_param(raw: &RawParams, name: &str) -> Result<NaiveDate, InvalidParams> {
    let value = raw
        .get(name)
        .ok_or_else(|| InvalidParams(format!("{name} is required")))?;
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| InvalidParams(format!("{name} must be a YYYY-MM-DD date, got '{value}'")))
}
