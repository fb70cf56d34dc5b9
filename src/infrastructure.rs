//! Infrastructure layer for configuration, logging, storage and HTTP access
//!
//! Every collaborator the scraping engine talks to through a trait has its
//! concrete implementations here: SQLite and in-memory stores, the JSON feed
//! fetcher, and the file or static configuration providers.

pub mod config;
pub mod database_connection;
pub mod http_client;
pub mod logging;
pub mod memory_store;
pub mod session_store;
pub mod sqlite_store;

// Re-export commonly used items
pub use config::{ConfigError, ConfigProvider, FileConfigProvider, LoggingConfig, ScraperConfig, StaticConfigProvider};
pub use database_connection::DatabaseConnection;
pub use http_client::HttpFeedFetcher;
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use memory_store::{InMemoryEnforcementStore, InMemoryProcessingLogStore};
pub use session_store::InMemorySessionStore;
pub use sqlite_store::{SqliteEnforcementStore, SqliteProcessingLogStore, SqliteSessionStore};
