//! Agency and record-type identifiers
//!
//! These two enums form the key of the strategy registry and of every
//! natural key, so their string codes are stable and used for storage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Regulatory body publishing enforcement data
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Agency {
    /// Health and Safety Executive
    Hse,
    /// Environment Agency
    #[serde(rename = "ea")]
    EnvironmentAgency,
}

impl Agency {
    pub const ALL: [Self; 2] = [Self::Hse, Self::EnvironmentAgency];

    /// Stable storage code
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Hse => "hse",
            Self::EnvironmentAgency => "ea",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Hse => "Health and Safety Executive",
            Self::EnvironmentAgency => "Environment Agency",
        }
    }
}

impl fmt::Display for Agency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Agency {
    type Err = UnknownIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hse" => Ok(Self::Hse),
            "ea" | "environment_agency" => Ok(Self::EnvironmentAgency),
            other => Err(UnknownIdentifier {
                kind: "agency",
                value: other.to_string(),
            }),
        }
    }
}

/// Category of enforcement data
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Court case / prosecution
    Case,
    /// Enforcement notice
    Notice,
}

impl RecordType {
    pub const ALL: [Self; 2] = [Self::Case, Self::Notice];

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Case => "case",
            Self::Notice => "notice",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for RecordType {
    type Err = UnknownIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "case" | "cases" => Ok(Self::Case),
            "notice" | "notices" => Ok(Self::Notice),
            other => Err(UnknownIdentifier {
                kind: "record type",
                value: other.to_string(),
            }),
        }
    }
}

/// Returned when an agency or record-type code is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownIdentifier {
    pub kind: &'static str,
    pub value: String,
}
