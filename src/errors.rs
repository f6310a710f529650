//! Error types for circuit breaker operations

use std::error::Error;
use std::fmt;

/// Errors that can occur when executing a call through a breaker
#[derive(Debug)]
pub enum CircuitError<E = Box<dyn Error + Send + Sync>> {
    /// Circuit is open, calls are being rejected without execution
    Open { circuit: String, opened_at: f64 },
    /// Half-open trial budget is exhausted, call rejected
    HalfOpenLimitReached { circuit: String },
    /// The wrapped operation failed
    Execution(E),
}

impl<E> CircuitError<E> {
    /// Whether this error means the breaker refused to execute the call
    /// (as opposed to the call itself failing)
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CircuitError::Open { .. } | CircuitError::HalfOpenLimitReached { .. }
        )
    }
}

impl<E: fmt::Display> fmt::Display for CircuitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitError::Open { circuit, opened_at } => {
                write!(f, "Circuit '{}' is open (opened at {})", circuit, opened_at)
            }
            CircuitError::HalfOpenLimitReached { circuit } => {
                write!(f, "Circuit '{}' half-open trial budget exhausted", circuit)
            }
            CircuitError::Execution(e) => write!(f, "Circuit execution failed: {}", e),
        }
    }
}

impl<E: Error + 'static> Error for CircuitError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CircuitError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors raised by the breaker registry
///
/// An unknown breaker name is a configuration error in the calling system,
/// not a runtime condition to recover from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no circuit breaker registered under name '{0}'")]
    UnknownBreaker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_variants() {
        let open: CircuitError<String> = CircuitError::Open {
            circuit: "db".to_string(),
            opened_at: 1.0,
        };
        let limit: CircuitError<String> = CircuitError::HalfOpenLimitReached {
            circuit: "db".to_string(),
        };
        let exec: CircuitError<String> = CircuitError::Execution("boom".to_string());

        assert!(open.is_rejection());
        assert!(limit.is_rejection());
        assert!(!exec.is_rejection());
    }

    #[test]
    fn test_display_formats() {
        let err: CircuitError<String> = CircuitError::Open {
            circuit: "db".to_string(),
            opened_at: 2.5,
        };
        assert!(err.to_string().contains("'db'"));

        let err = RegistryError::UnknownBreaker("externalApi".to_string());
        assert!(err.to_string().contains("externalApi"));
    }
}
