//! Enforcement Scraper - regulatory enforcement data collection engine
//!
//! Runs paced, cancellable scraping sessions against agency feeds of court
//! cases and enforcement notices, de-duplicates what they return against
//! the local store, and keeps an audit log per processed batch.

// Module declarations
pub mod domain;
pub mod infrastructure;
pub mod scraping;

#[cfg(test)]
mod test_utils;

pub use domain::{Agency, RecordType, Session, SessionStatus, StopReason};
pub use scraping::{ScrapeCoordinator, ScrapeError, StrategyRegistry};
