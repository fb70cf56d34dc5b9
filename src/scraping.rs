//! Scraping engine: coordinator, strategies and their shared services
//!
//! The coordinator drives one session through its strategy. Strategies are
//! looked up in a static registry and share the duplicate/update routine,
//! the rate limiter and the fetch collaborator.

pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod rate_limiter;
pub mod registry;
pub mod strategies;
pub mod strategy;

// Re-export commonly used items
pub use coordinator::ScrapeCoordinator;
pub use dedup::{changed_fields, persist_candidate};
pub use error::{FetchFailure, InvalidParams, ProcessingError, ScrapeError};
pub use events::{BroadcastEventSink, EventSink, NoopEventSink, RecordingEventSink, ScrapeEvent};
pub use fetcher::{FetchRequest, RecordFetcher};
pub use rate_limiter::ScrapeRateLimiter;
pub use registry::StrategyRegistry;
pub use strategy::{ProcessedRecord, ScrapeStrategy, StrategyDeps};
