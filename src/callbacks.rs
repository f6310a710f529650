//! Callback system for circuit breaker state transitions
//!
//! Observers are invoked after a transition commits and after the breaker's
//! lock is released, so a slow observer cannot stall the breaker.

use crate::circuit::CircuitState;
use std::sync::Arc;

/// A committed state transition, handed to observers
#[derive(Debug, Clone)]
pub struct StateChange {
    pub circuit: String,
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Type alias for a transition observer
pub type TransitionObserver = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// Callbacks for circuit breaker events
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_close: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_half_open: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    /// Ordered list of observers fired on every transition
    pub observers: Vec<TransitionObserver>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the per-state slot and every observer for a committed change
    pub fn notify(&self, change: &StateChange) {
        match change.to {
            CircuitState::Open => {
                if let Some(ref callback) = self.on_open {
                    callback(&change.circuit);
                }
            }
            CircuitState::Closed => {
                if let Some(ref callback) = self.on_close {
                    callback(&change.circuit);
                }
            }
            CircuitState::HalfOpen => {
                if let Some(ref callback) = self.on_half_open {
                    callback(&change.circuit);
                }
            }
        }

        for observer in &self.observers {
            observer(change);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_fires_matching_slot_and_observers() {
        let opens = Arc::new(AtomicUsize::new(0));
        let observed = Arc::new(AtomicUsize::new(0));

        let opens_clone = opens.clone();
        let observed_clone = observed.clone();

        let mut callbacks = Callbacks::new();
        callbacks.on_open = Some(Arc::new(move |_name| {
            opens_clone.fetch_add(1, Ordering::SeqCst);
        }));
        callbacks.observers.push(Arc::new(move |_change| {
            observed_clone.fetch_add(1, Ordering::SeqCst);
        }));

        callbacks.notify(&StateChange {
            circuit: "test".to_string(),
            from: CircuitState::Closed,
            to: CircuitState::Open,
        });

        callbacks.notify(&StateChange {
            circuit: "test".to_string(),
            from: CircuitState::Open,
            to: CircuitState::HalfOpen,
        });

        // on_open fired once, observers fired for both transitions
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(observed.load(Ordering::SeqCst), 2);
    }
}
