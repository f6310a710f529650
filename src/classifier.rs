//! Failure classification for error filtering
//!
//! A classifier decides whether a given operation error should count as a
//! failed outcome. An error the classifier declines to count is recorded as
//! a success, so expected errors (validation failures, 4xx responses) do not
//! inflate the failure rate while still flowing back to the caller.

use std::any::Any;

/// Context provided to failure classifiers for error evaluation
#[derive(Debug)]
pub struct FailureContext<'a> {
    /// Circuit name
    pub circuit_name: &'a str,
    /// The error that occurred (can be downcast to specific types)
    pub error: &'a dyn Any,
    /// Duration of the failed call in seconds
    pub duration: f64,
}

/// Trait for classifying failures
///
/// Returns `true` if the error should count as a failed outcome, `false`
/// to record it as a success for rate purposes.
pub trait FailureClassifier: Send + Sync + std::fmt::Debug {
    fn is_failure(&self, ctx: &FailureContext<'_>) -> bool;
}

/// Default classifier: every operation error counts as a failure
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl FailureClassifier for DefaultClassifier {
    fn is_failure(&self, _ctx: &FailureContext<'_>) -> bool {
        true
    }
}

/// Predicate-based classifier using a closure
pub struct PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> FailureClassifier for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn is_failure(&self, ctx: &FailureContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

impl<F> std::fmt::Debug for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateClassifier")
            .field("predicate", &"<closure>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classifier_counts_all() {
        let classifier = DefaultClassifier;
        let ctx = FailureContext {
            circuit_name: "test",
            error: &"any error" as &dyn Any,
            duration: 0.1,
        };

        assert!(classifier.is_failure(&ctx));
    }

    #[test]
    fn test_predicate_classifier_by_duration() {
        // Only count errors that took longer than a second
        let classifier = PredicateClassifier::new(|ctx| ctx.duration > 1.0);

        let fast_ctx = FailureContext {
            circuit_name: "test",
            error: &"fast error" as &dyn Any,
            duration: 0.5,
        };
        let slow_ctx = FailureContext {
            circuit_name: "test",
            error: &"slow error" as &dyn Any,
            duration: 2.0,
        };

        assert!(!classifier.is_failure(&fast_ctx));
        assert!(classifier.is_failure(&slow_ctx));
    }

    #[test]
    fn test_error_type_downcast() {
        #[derive(Debug)]
        struct ApiError {
            status: u16,
        }

        // Server errors count, client errors do not; unknown types count
        let classifier = PredicateClassifier::new(|ctx| {
            ctx.error
                .downcast_ref::<ApiError>()
                .map(|e| e.status >= 500)
                .unwrap_or(true)
        });

        let server = ApiError { status: 503 };
        let client = ApiError { status: 404 };

        let server_ctx = FailureContext {
            circuit_name: "test",
            error: &server as &dyn Any,
            duration: 0.1,
        };
        let client_ctx = FailureContext {
            circuit_name: "test",
            error: &client as &dyn Any,
            duration: 0.1,
        };

        assert!(classifier.is_failure(&server_ctx));
        assert!(!classifier.is_failure(&client_ctx));
    }
}
