//! Builder pattern for circuit breaker configuration

use crate::callbacks::{Callbacks, StateChange};
use crate::circuit::{CircuitBreaker, CircuitContext, Config};
use crate::classifier::FailureClassifier;
use crate::window::OutcomeWindow;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Builder for creating configured circuit breakers
///
/// ```
/// use circuit_guard::CircuitBreaker;
///
/// let circuit = CircuitBreaker::builder("database")
///     .sliding_window_size(10)
///     .minimum_calls(5)
///     .failure_rate_threshold(50.0)
///     .wait_duration_open_secs(30.0)
///     .half_open_permits(3)
///     .build();
/// ```
#[derive(Debug)]
pub struct CircuitBuilder {
    name: String,
    config: Config,
    classifier: Option<Arc<dyn FailureClassifier>>,
    callbacks: Callbacks,
}

impl CircuitBuilder {
    /// Create a new builder with default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            classifier: None,
            callbacks: Callbacks::new(),
        }
    }

    /// Replace the whole configuration (presets like [`Config::database`])
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Failure rate (percent, 0-100) at or above which the breaker opens
    pub fn failure_rate_threshold(mut self, percent: f64) -> Self {
        self.config.failure_rate_threshold = percent.clamp(0.0, 100.0);
        self
    }

    /// Slow-call rate (percent, 0-100) at or above which the breaker opens
    pub fn slow_call_rate_threshold(mut self, percent: f64) -> Self {
        self.config.slow_call_rate_threshold = percent.clamp(0.0, 100.0);
        self
    }

    /// Duration in seconds at which a call counts as slow
    pub fn slow_call_duration_secs(mut self, secs: f64) -> Self {
        self.config.slow_call_duration_secs = secs;
        self
    }

    /// Number of most-recent outcomes retained for rate evaluation
    pub fn sliding_window_size(mut self, size: usize) -> Self {
        self.config.sliding_window_size = size.max(1);
        self
    }

    /// Outcomes required before the rates are evaluated at all
    pub fn minimum_calls(mut self, calls: usize) -> Self {
        self.config.minimum_calls = calls.max(1);
        self
    }

    /// Seconds to stay open before a half-open transition is attempted
    pub fn wait_duration_open_secs(mut self, secs: f64) -> Self {
        self.config.wait_duration_open_secs = secs;
        self
    }

    /// Trial-call budget while half-open
    pub fn half_open_permits(mut self, permits: usize) -> Self {
        self.config.half_open_permits = permits.max(1);
        self
    }

    /// Whether open -> half-open happens on the timer (true) or only via
    /// an explicit probe (false)
    pub fn automatic_transition(mut self, automatic: bool) -> Self {
        self.config.automatic_transition = automatic;
        self
    }

    /// Jitter factor (0.0-1.0) applied to the open wait, spreading out
    /// recovery attempts across instances
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Set a failure classifier to filter which errors count
    pub fn classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(callback));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(callback));
        self
    }

    /// Set callback for when circuit transitions to half-open
    pub fn on_half_open<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(callback));
        self
    }

    /// Add an observer fired on every committed transition
    pub fn on_transition<F>(mut self, observer: F) -> Self
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.callbacks.observers.push(Arc::new(observer));
        self
    }

    /// Build the circuit breaker
    pub fn build(self) -> CircuitBreaker {
        let window = Arc::new(OutcomeWindow::new(self.config.sliding_window_size));
        let context = CircuitContext {
            name: self.name,
            config: self.config,
            window,
            classifier: self.classifier,
            probe: Arc::new(AtomicBool::new(false)),
        };

        CircuitBreaker::with_context_and_callbacks(context, self.callbacks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let circuit = CircuitBuilder::new("test").build();

        assert_eq!(circuit.name(), "test");
        assert!(circuit.is_closed());
    }

    #[test]
    fn test_builder_applies_preset_then_overrides() {
        let circuit = CircuitBuilder::new("externalApi")
            .config(Config::external_api())
            .wait_duration_open_secs(5.0)
            .build();

        assert_eq!(circuit.name(), "externalApi");
        assert!(circuit.is_closed());
    }

    #[test]
    fn test_builder_clamps_degenerate_values() {
        // Out-of-range settings are clamped rather than rejected
        let circuit = CircuitBuilder::new("test")
            .failure_rate_threshold(150.0)
            .slow_call_rate_threshold(-20.0)
            .sliding_window_size(0)
            .minimum_calls(0)
            .half_open_permits(0)
            .jitter_factor(3.0)
            .build();

        assert!(circuit.is_closed());

        // A window of one with a floor of one still behaves sanely: one
        // recorded failure is a 100% rate
        let _ = circuit.call(|| Err::<(), _>("error"));
        assert!(circuit.is_open());
    }

    #[test]
    fn test_builder_with_callbacks() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let opened = Arc::new(AtomicBool::new(false));
        let opened_clone = opened.clone();

        let circuit = CircuitBuilder::new("test")
            .sliding_window_size(4)
            .minimum_calls(2)
            .failure_rate_threshold(50.0)
            .on_open(move |name| {
                assert_eq!(name, "test");
                opened_clone.store(true, Ordering::SeqCst);
            })
            .build();

        let _ = circuit.call(|| Err::<(), _>("error 1"));
        let _ = circuit.call(|| Err::<(), _>("error 2"));

        assert!(opened.load(Ordering::SeqCst));
    }
}
