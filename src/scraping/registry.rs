//! Static (agency, record type) → strategy table
//!
//! The set of supported pairs is fixed at build time. Construction builds one
//! strategy instance per pair over the shared collaborators; lookups of pairs
//! outside the table fail with [`ScrapeError::StrategyNotFound`].

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::error::ScrapeError;
use super::strategies::environment_agency::EnvironmentAgencyStrategy;
use super::strategies::hse::HseStrategy;
use super::strategy::{ScrapeStrategy, StrategyDeps};
use crate::domain::{Agency, RecordType};

type StrategyFactory = fn(&StrategyDeps, RecordType) -> Arc<dyn ScrapeStrategy>;

const SUPPORTED: &[(Agency, RecordType, StrategyFactory)] = &[
    (Agency::Hse, RecordType::Case, HseStrategy::build),
    (Agency::Hse, RecordType::Notice, HseStrategy::build),
    (Agency::EnvironmentAgency, RecordType::Case, EnvironmentAgencyStrategy::build),
    (Agency::EnvironmentAgency, RecordType::Notice, EnvironmentAgencyStrategy::build),
];

#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<(Agency, RecordType), Arc<dyn ScrapeStrategy>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("registered", &self.registered())
            .finish()
    }
}

impl StrategyRegistry {
    /// Registry with every supported pair wired to `deps`.
    #[must_use]
    pub fn new(deps: &StrategyDeps) -> Self {
        let mut registry = Self::empty();
        for &(agency, record_type, build) in SUPPORTED {
            let strategy = build(deps, record_type);
            debug_assert_eq!((strategy.agency(), strategy.record_type()), (agency, record_type));
            registry.register(strategy);
        }
        debug!(count = registry.strategies.len(), "Strategy registry built");
        registry
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds or replaces the strategy for its own (agency, record type).
    pub fn register(&mut self, strategy: Arc<dyn ScrapeStrategy>) {
        self.strategies
            .insert((strategy.agency(), strategy.record_type()), strategy);
    }

    pub fn lookup(&self, agency: Agency, record_type: RecordType) -> Result<Arc<dyn ScrapeStrategy>, ScrapeError> {
        self.strategies
            .get(&(agency, record_type))
            .cloned()
            .ok_or(ScrapeError::StrategyNotFound { agency, record_type })
    }

    /// Registered pairs in a stable order.
    #[must_use]
    pub fn registered(&self) -> Vec<(Agency, RecordType)> {
        let mut pairs: Vec<_> = self.strategies.keys().copied().collect();
        pairs.sort_by_key(|(agency, record_type)| (agency.code(), record_type.code()));
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_store::InMemoryEnforcementStore;
    use crate::scraping::rate_limiter::ScrapeRateLimiter;
    use crate::test_utils::ScriptedFetcher;

    fn deps() -> StrategyDeps {
        StrategyDeps {
            fetcher: Arc::new(ScriptedFetcher::default()),
            store: Arc::new(InMemoryEnforcementStore::new()),
            rate_limiter: Arc::new(ScrapeRateLimiter::new()),
        }
    }

    #[test]
    fn every_supported_pair_resolves_to_a_matching_strategy() {
        let registry = StrategyRegistry::new(&deps());
        for agency in Agency::ALL {
            for record_type in RecordType::ALL {
                let strategy = registry.lookup(agency, record_type).unwrap();
                assert_eq!(strategy.agency(), agency);
                assert_eq!(strategy.record_type(), record_type);
            }
        }
        assert_eq!(registry.registered().len(), 4);
    }

    #[test]
    fn unregistered_pair_is_strategy_not_found() {
        let mut registry = StrategyRegistry::empty();
        registry.register(HseStrategy::build(&deps(), RecordType::Case));

        assert!(registry.lookup(Agency::Hse, RecordType::Case).is_ok());
        let err = registry
            .lookup(Agency::EnvironmentAgency, RecordType::Notice)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ScrapeError::StrategyNotFound {
                agency: Agency::EnvironmentAgency,
                record_type: RecordType::Notice
            }
        ));
    }

    #[test]
    fn display_names_are_human_readable() {
        let registry = StrategyRegistry::new(&deps());
        let name = registry.lookup(Agency::Hse, RecordType::Notice).unwrap().display_name();
        assert!(name.contains("notice"), "{name}");
    }
}
