//! Run parameters and fetch cursors
//!
//! Parameters arrive as an untyped string map from whoever starts a run and
//! are normalized by the owning strategy into [`ScrapeParams`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unvalidated parameters as supplied by the caller
pub type RawParams = BTreeMap<String, String>;

/// Validated, agency-specific parameter bag
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScrapeParams {
    PageRange {
        start_page: u32,
        end_page: Option<u32>,
    },
    DateRange {
        date_from: NaiveDate,
        date_to: NaiveDate,
    },
}

/// Position of the unit currently being fetched
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cursor {
    Page { page: u32 },
    DateRange { from: NaiveDate, to: NaiveDate },
}

impl Cursor {
    /// True when `self` is a legal successor of `previous`.
    #[must_use]
    pub fn advances_from(&self, previous: &Self) -> bool {
        match (previous, self) {
            (Self::Page { page: prev }, Self::Page { page: next }) => next > prev,
            (Self::DateRange { to: prev_to, .. }, Self::DateRange { from, .. }) => from > prev_to,
            _ => false,
        }
    }

    /// Page number for page cursors; date-range runs are a single batch.
    #[must_use]
    pub const fn batch_number(&self) -> u32 {
        match self {
            Self::Page { page } => *page,
            Self::DateRange { .. } => 1,
        }
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Page { page } => write!(f, "page {page}"),
            Self::DateRange { from, to } => write!(f, "{from}..{to}"),
        }
    }
}
