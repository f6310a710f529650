//! circuit-guard - circuit breaker with sliding-window outcome metrics
//!
//! This crate protects callers from cascading failures of an unreliable
//! dependency by gating calls through a circuit breaker:
//! - Ring-buffer window over the last N call outcomes with live failure
//!   and slow-call rates
//! - State machine for the breaker lifecycle (Closed → Open → HalfOpen)
//! - Fallback dispatch so blocked or failed calls degrade to a fast,
//!   caller-supplied substitute instead of cascading timeouts
//! - Named registry holding one independently configured breaker per
//!   dependency
//!
//! # Example
//!
//! ```rust
//! use circuit_guard::{CircuitBreaker, Config};
//!
//! let circuit = CircuitBreaker::builder("database")
//!     .config(Config::database())
//!     .on_open(|name| println!("Circuit {} opened!", name))
//!     .build();
//!
//! // Execute with circuit protection
//! let result = circuit.call(|| {
//!     // Your dependency call here
//!     Ok::<_, String>("success")
//! });
//!
//! if circuit.is_open() {
//!     println!("Circuit is open, calls are being rejected");
//! }
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod classifier;
pub mod errors;
pub mod registry;
pub mod window;

pub use builder::CircuitBuilder;
pub use callbacks::{Callbacks, StateChange};
pub use circuit::{
    BreakerStatus, CallOptions, CircuitBreaker, CircuitState, Config, FallbackContext, FallbackFn,
    FallbackPolicy, IntoCallOptions,
};
pub use classifier::{DefaultClassifier, FailureClassifier, FailureContext, PredicateClassifier};
pub use errors::{CircuitError, RegistryError};
pub use registry::Registry;
pub use window::{OutcomeWindow, RATE_UNDEFINED, WindowMetrics};

/// Classification of a single recorded call outcome
///
/// Slow and failed are not mutually exclusive: a slow failure counts
/// toward both the failure rate and the slow-call rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    Failure,
    SlowSuccess,
    SlowFailure,
}

impl OutcomeKind {
    /// Classify from the executor's observations
    pub fn classify(success: bool, slow: bool) -> Self {
        match (success, slow) {
            (true, false) => OutcomeKind::Success,
            (false, false) => OutcomeKind::Failure,
            (true, true) => OutcomeKind::SlowSuccess,
            (false, true) => OutcomeKind::SlowFailure,
        }
    }

    /// Whether this outcome counts toward the failure rate
    pub fn is_failure(self) -> bool {
        matches!(self, OutcomeKind::Failure | OutcomeKind::SlowFailure)
    }

    /// Whether this outcome counts toward the slow-call rate
    pub fn is_slow(self) -> bool {
        matches!(self, OutcomeKind::SlowSuccess | OutcomeKind::SlowFailure)
    }
}

/// A single call outcome recorded by the breaker
#[derive(Debug, Clone)]
pub struct Outcome {
    pub kind: OutcomeKind,
    /// Observed elapsed duration in seconds
    pub duration: f64,
    /// Monotonic timestamp in seconds, relative to the window's anchor
    pub timestamp: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_covers_all_combinations() {
        assert_eq!(OutcomeKind::classify(true, false), OutcomeKind::Success);
        assert_eq!(OutcomeKind::classify(false, false), OutcomeKind::Failure);
        assert_eq!(OutcomeKind::classify(true, true), OutcomeKind::SlowSuccess);
        assert_eq!(OutcomeKind::classify(false, true), OutcomeKind::SlowFailure);
    }

    #[test]
    fn test_slow_failure_counts_toward_both_rates() {
        let kind = OutcomeKind::SlowFailure;
        assert!(kind.is_failure());
        assert!(kind.is_slow());
    }

    #[test]
    fn test_slow_success_is_not_a_failure() {
        let kind = OutcomeKind::SlowSuccess;
        assert!(!kind.is_failure());
        assert!(kind.is_slow());
    }
}
