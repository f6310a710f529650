//! Named registry of circuit breakers
//!
//! A process typically holds one breaker per downstream dependency, created
//! at startup and looked up by name at call sites. The registry owns those
//! breakers behind `Arc` so call sites can hold a handle without going
//! through the map on every call.

use crate::circuit::{BreakerStatus, CircuitBreaker, Config};
use crate::errors::RegistryError;
use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent map of named circuit breakers
#[derive(Debug, Default)]
pub struct Registry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a breaker under `name`, replacing any existing one
    ///
    /// Replacement is the explicit reset mechanism: the old breaker's state
    /// and window are discarded along with it, and handles held elsewhere
    /// keep the old breaker alive but detached.
    pub fn register(&self, name: impl Into<String>, config: Config) -> Arc<CircuitBreaker> {
        let name = name.into();
        let breaker = Arc::new(CircuitBreaker::new(name.clone(), config));
        if self.breakers.insert(name.clone(), breaker.clone()).is_some() {
            tracing::info!(circuit = %name, "replaced registered circuit breaker");
        }
        breaker
    }

    /// Register a pre-built breaker (for builder-configured instances)
    pub fn register_breaker(&self, breaker: CircuitBreaker) -> Arc<CircuitBreaker> {
        let name = breaker.name().to_string();
        let breaker = Arc::new(breaker);
        self.breakers.insert(name, breaker.clone());
        breaker
    }

    /// Look up a breaker by name
    pub fn get(&self, name: &str) -> Result<Arc<CircuitBreaker>, RegistryError> {
        self.breakers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::UnknownBreaker(name.to_string()))
    }

    /// Status snapshot for one breaker
    pub fn status(&self, name: &str) -> Result<BreakerStatus, RegistryError> {
        Ok(self.get(name)?.status())
    }

    /// Status snapshots for every registered breaker, sorted by name
    pub fn status_all(&self) -> Vec<(String, BreakerStatus)> {
        let mut statuses: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        statuses
    }

    /// Number of registered breakers
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
