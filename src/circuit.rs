//! Circuit breaker implementation using state machines
//!
//! One breaker owns one outcome window, one configuration and the current
//! state (Closed / Open / HalfOpen). Permission checks, outcome recording
//! and transition evaluation are serialized behind a per-breaker lock; the
//! wrapped operation itself always runs outside that lock.

use crate::{
    OutcomeKind,
    callbacks::{Callbacks, StateChange},
    classifier::{FailureClassifier, FailureContext},
    errors::CircuitError,
    window::OutcomeWindow,
};
use serde::Serialize;
use state_machines::state_machine;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Circuit breaker configuration
///
/// Rate thresholds are percentages in 0-100; durations are seconds.
#[derive(Debug, Clone)]
pub struct Config {
    /// Failure rate at or above which the breaker opens
    pub failure_rate_threshold: f64,

    /// Slow-call rate at or above which the breaker opens
    pub slow_call_rate_threshold: f64,

    /// Calls lasting at least this many seconds are classified slow
    pub slow_call_duration_secs: f64,

    /// Number of most-recent outcomes retained in the window
    pub sliding_window_size: usize,

    /// Outcomes required before rates are evaluated; below this the rates
    /// are reported as undefined and thresholds never trip
    pub minimum_calls: usize,

    /// Seconds spent open before a transition to half-open is attempted
    pub wait_duration_open_secs: f64,

    /// Trial-call budget while half-open
    pub half_open_permits: usize,

    /// If false, open -> half-open happens only via an explicit probe
    pub automatic_transition: bool,

    /// Jitter factor for the open wait (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: wait * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            slow_call_rate_threshold: 100.0,
            slow_call_duration_secs: 60.0,
            sliding_window_size: 100,
            minimum_calls: 10,
            wait_duration_open_secs: 60.0,
            half_open_permits: 10,
            automatic_transition: true,
            jitter_factor: 0.0,
        }
    }
}

impl Config {
    /// Recommended settings for a database breaker
    pub fn database() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            slow_call_rate_threshold: 50.0,
            slow_call_duration_secs: 2.0,
            sliding_window_size: 10,
            minimum_calls: 5,
            wait_duration_open_secs: 30.0,
            half_open_permits: 3,
            automatic_transition: true,
            jitter_factor: 0.0,
        }
    }

    /// Recommended settings for an external-API breaker (more tolerant)
    pub fn external_api() -> Self {
        Self {
            failure_rate_threshold: 60.0,
            slow_call_rate_threshold: 70.0,
            slow_call_duration_secs: 5.0,
            sliding_window_size: 5,
            minimum_calls: 3,
            wait_duration_open_secs: 60.0,
            half_open_permits: 2,
            automatic_transition: true,
            jitter_factor: 0.0,
        }
    }

    /// The window never holds more than its capacity, so a minimum above it
    /// could never be met and the breaker would never trip
    fn effective_minimum_calls(&self) -> usize {
        self.minimum_calls.min(self.sliding_window_size)
    }

    /// Same capacity cap for the half-open trial floor
    fn effective_trial_floor(&self) -> usize {
        self.half_open_permits.min(self.sliding_window_size)
    }
}

/// Current state of a circuit breaker
///
/// Serializes with the same names `Display` emits, so a status endpoint
/// and the logs agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

fn state_from_name(name: &str) -> CircuitState {
    match name {
        "Open" => CircuitState::Open,
        "HalfOpen" => CircuitState::HalfOpen,
        _ => CircuitState::Closed,
    }
}

/// Read-only status snapshot for observability endpoints
///
/// Rates are -1.0 while `total_calls` is below the minimum-calls floor
/// (capped at the window capacity).
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub failure_rate: f64,
    pub slow_call_rate: f64,
    pub total_calls: usize,
    pub failed_calls: usize,
    pub slow_calls: usize,
    pub successful_calls: usize,
}

/// Context provided to fallback closures
#[derive(Debug, Clone)]
pub struct FallbackContext {
    /// Circuit name
    pub circuit_name: String,
    /// Current circuit state
    pub state: CircuitState,
    /// True when the breaker refused the call; false when the operation
    /// itself failed
    pub rejected: bool,
}

/// When the fallback producer is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Fallback on rejection and on operation failure (the "read" policy)
    #[default]
    AnyFailure,
    /// Fallback only on rejection; operation failures propagate
    RejectedOnly,
}

/// Type alias for fallback function
pub type FallbackFn<T, E> = Box<dyn FnOnce(&FallbackContext) -> Result<T, E> + Send>;

/// Options for circuit breaker calls
pub struct CallOptions<T, E> {
    /// Optional fallback function
    pub fallback: Option<FallbackFn<T, E>>,
    /// When the fallback applies
    pub policy: FallbackPolicy,
}

impl<T, E> Default for CallOptions<T, E> {
    fn default() -> Self {
        Self {
            fallback: None,
            policy: FallbackPolicy::default(),
        }
    }
}

impl<T, E> CallOptions<T, E> {
    /// Create new call options with no fallback
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a fallback function
    pub fn with_fallback<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&FallbackContext) -> Result<T, E> + Send + 'static,
    {
        self.fallback = Some(Box::new(f));
        self
    }

    /// Set when the fallback applies
    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Type alias for callable function
pub type CallableFn<T, E> = Box<dyn FnOnce() -> Result<T, E>>;

/// Trait for converting into CallOptions - allows flexible call() API
pub trait IntoCallOptions<T, E> {
    fn into_call_options(self) -> (CallableFn<T, E>, CallOptions<T, E>);
}

/// Implement for plain closures
impl<T, E, F> IntoCallOptions<T, E> for F
where
    F: FnOnce() -> Result<T, E> + 'static,
{
    fn into_call_options(self) -> (Box<dyn FnOnce() -> Result<T, E>>, CallOptions<T, E>) {
        (Box::new(self), CallOptions::default())
    }
}

/// Implement for (closure, CallOptions) tuple
impl<T, E, F> IntoCallOptions<T, E> for (F, CallOptions<T, E>)
where
    F: FnOnce() -> Result<T, E> + 'static,
{
    fn into_call_options(self) -> (Box<dyn FnOnce() -> Result<T, E>>, CallOptions<T, E>) {
        (Box::new(self.0), self.1)
    }
}

/// Circuit breaker context - shared data across all states
#[derive(Clone)]
pub struct CircuitContext {
    pub name: String,
    pub config: Config,
    pub window: Arc<OutcomeWindow>,
    pub classifier: Option<Arc<dyn FailureClassifier>>,
    /// Armed by `probe()` so the reset guard fires ahead of the timer
    pub probe: Arc<AtomicBool>,
}

impl Default for CircuitContext {
    fn default() -> Self {
        let config = Config::default();
        let window = Arc::new(OutcomeWindow::new(config.sliding_window_size));
        Self {
            name: String::new(),
            config,
            window,
            classifier: None,
            probe: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl fmt::Debug for CircuitContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitContext")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("window", &self.window)
            .field(
                "classifier",
                &self.classifier.as_ref().map(|_| "<dyn FailureClassifier>"),
            )
            .finish()
    }
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    pub opened_at: f64,
}

/// Data specific to the HalfOpen state
#[derive(Debug, Clone, Default)]
pub struct HalfOpenData {
    /// Calls permitted through since entering half-open
    pub permitted_calls: usize,
    /// Trial outcomes recorded since entering half-open
    pub recorded_outcomes: usize,
}

// Define the circuit breaker state machine with dynamic mode
state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,  // Enable dynamic mode for runtime state transitions

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen(HalfOpenData),
    ],
    events {
        trip {
            guards: [should_open],
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [reset_ready],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            guards: [should_close],
            transition: { from: HalfOpen, to: Closed }
        }
    }
}

// Guards for dynamic mode - implemented on typestate machines
impl Circuit<Closed> {
    /// Check whether the window's failure or slow-call rate trips the breaker
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        let min_calls = ctx.config.effective_minimum_calls();
        let metrics = ctx.window.metrics(min_calls);

        metrics.total_calls >= min_calls
            && (metrics.failure_rate >= ctx.config.failure_rate_threshold
                || metrics.slow_call_rate >= ctx.config.slow_call_rate_threshold)
    }
}

impl Circuit<HalfOpen> {
    /// Whether the trial batch is complete
    fn trial_resolved(&self, ctx: &CircuitContext) -> bool {
        let data = self
            .state_data_half_open()
            .expect("HalfOpen state must have data");
        data.recorded_outcomes >= ctx.config.half_open_permits
    }

    /// Re-open when the completed trial batch still meets a threshold
    ///
    /// The trial budget, not `minimum_calls`, is the evaluation floor: the
    /// window holds only the trial outcomes at this point. The floor is
    /// capped at the window capacity so eviction during a trial larger
    /// than the window cannot leave the rates undefined.
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        if !self.trial_resolved(ctx) {
            return false;
        }

        let metrics = ctx.window.metrics(ctx.config.effective_trial_floor());
        metrics.failure_rate >= ctx.config.failure_rate_threshold
            || metrics.slow_call_rate >= ctx.config.slow_call_rate_threshold
    }

    /// Close when the completed trial batch meets no threshold
    fn should_close(&self, ctx: &CircuitContext) -> bool {
        if !self.trial_resolved(ctx) {
            return false;
        }

        let metrics = ctx.window.metrics(ctx.config.effective_trial_floor());
        metrics.failure_rate < ctx.config.failure_rate_threshold
            && metrics.slow_call_rate < ctx.config.slow_call_rate_threshold
    }
}

impl Circuit<Open> {
    /// Check if the open wait has elapsed (or a probe is armed)
    fn reset_ready(&self, ctx: &CircuitContext) -> bool {
        if ctx.probe.load(Ordering::Acquire) {
            return true;
        }

        let data = self.state_data_open().expect("Open state must have data");
        let elapsed = ctx.window.monotonic_time() - data.opened_at;
        elapsed >= open_wait_secs(&ctx.config)
    }
}

/// Open wait with the configured jitter applied
fn open_wait_secs(config: &Config) -> f64 {
    if config.jitter_factor > 0.0 {
        let policy = chrono_machines::Policy {
            max_attempts: 1,
            base_delay_ms: (config.wait_duration_open_secs * 1000.0) as u64,
            multiplier: 1.0,
            max_delay_ms: (config.wait_duration_open_secs * 1000.0) as u64,
        };
        let wait_ms = policy.calculate_delay(1, config.jitter_factor);
        (wait_ms as f64) / 1000.0
    } else {
        config.wait_duration_open_secs
    }
}

/// Machine plus the generation counter, guarded by the breaker's lock
struct Core {
    machine: DynamicCircuit,
    /// Bumped on every committed transition; an outcome whose call started
    /// under an older generation is dropped instead of polluting the
    /// current window
    generation: u64,
}

/// A call refused by the breaker before execution
#[derive(Debug)]
enum Rejection {
    Open { opened_at: f64 },
    HalfOpenLimit,
}

/// Circuit breaker public API
///
/// All methods take `&self`; bookkeeping is serialized internally per
/// breaker, so breakers for different dependencies never contend.
pub struct CircuitBreaker {
    core: Mutex<Core>,
    context: CircuitContext,
    callbacks: Callbacks,
}

impl CircuitBreaker {
    /// Create a new circuit breaker (use builder() for more options)
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        let window = Arc::new(OutcomeWindow::new(config.sliding_window_size));
        let context = CircuitContext {
            name: name.into(),
            config,
            window,
            classifier: None,
            probe: Arc::new(AtomicBool::new(false)),
        };

        Self::with_context_and_callbacks(context, Callbacks::new())
    }

    /// Create a circuit breaker with custom context and callbacks (used by builder)
    pub(crate) fn with_context_and_callbacks(context: CircuitContext, callbacks: Callbacks) -> Self {
        let machine = DynamicCircuit::new(context.clone());

        Self {
            core: Mutex::new(Core {
                machine,
                generation: 0,
            }),
            context,
            callbacks,
        }
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }

    /// Circuit name
    pub fn name(&self) -> &str {
        &self.context.name
    }

    /// Execute a fallible operation with circuit breaker protection
    ///
    /// Accepts either:
    /// - A plain closure: `circuit.call(|| db_query())`
    /// - A closure with options: `circuit.call((|| db_query(), CallOptions::new().with_fallback(...)))`
    ///
    /// The operation runs outside the breaker's lock; only the permission
    /// check and outcome recording are serialized.
    pub fn call<I, T, E: 'static>(&self, input: I) -> Result<T, CircuitError<E>>
    where
        I: IntoCallOptions<T, E>,
    {
        let (f, options) = input.into_call_options();

        let generation = match self.acquire() {
            Ok(generation) => generation,
            Err(rejection) => return self.reject(rejection, options),
        };

        let start = self.context.window.monotonic_time();
        let result = f();
        let duration = self.context.window.monotonic_time() - start;

        let success = match &result {
            Ok(_) => true,
            Err(e) => !self.counts_as_failure(e, duration),
        };

        self.record_outcome(generation, success, duration);

        match result {
            Ok(val) => Ok(val),
            Err(e) => {
                if options.policy == FallbackPolicy::AnyFailure
                    && let Some(fallback) = options.fallback
                {
                    let ctx = FallbackContext {
                        circuit_name: self.context.name.clone(),
                        state: self.state(),
                        rejected: false,
                    };
                    return fallback(&ctx).map_err(CircuitError::Execution);
                }
                Err(CircuitError::Execution(e))
            }
        }
    }

    /// Manually drive an open breaker into half-open
    ///
    /// This is the explicit probe for configurations with
    /// `automatic_transition` disabled; it does not wait for the open
    /// timer. Returns true if the transition committed.
    pub fn probe(&self) -> bool {
        self.context.probe.store(true, Ordering::Release);

        let mut changes = Vec::new();
        let transitioned;
        {
            let mut core = self.core.lock().unwrap();
            transitioned = core.machine.current_state() == "Open"
                && core.machine.handle(CircuitEvent::AttemptReset).is_ok();
            if transitioned {
                self.enter_half_open(&mut core, &mut changes);
            } else {
                self.context.probe.store(false, Ordering::Release);
            }
        }

        self.notify(&changes);
        transitioned
    }

    /// Check if circuit is open
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Check if circuit is closed
    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Check if circuit is half-open
    pub fn is_half_open(&self) -> bool {
        self.state() == CircuitState::HalfOpen
    }

    /// Get current state
    ///
    /// Pure read: never triggers the open-timer transition, which happens
    /// only on permission checks.
    pub fn state(&self) -> CircuitState {
        state_from_name(self.core.lock().unwrap().machine.current_state())
    }

    /// Read-only status snapshot for observability
    pub fn status(&self) -> BreakerStatus {
        let state = self.state();
        let metrics = self
            .context
            .window
            .metrics(self.context.config.effective_minimum_calls());

        BreakerStatus {
            state,
            failure_rate: metrics.failure_rate,
            slow_call_rate: metrics.slow_call_rate,
            total_calls: metrics.total_calls,
            failed_calls: metrics.failed_calls,
            slow_calls: metrics.slow_calls,
            successful_calls: metrics.total_calls - metrics.failed_calls,
        }
    }

    /// Permission check: returns the generation to attribute the outcome to,
    /// or the rejection. Drives the lazy open -> half-open transition.
    fn acquire(&self) -> Result<u64, Rejection> {
        let mut changes = Vec::new();
        let outcome;
        {
            let mut core = self.core.lock().unwrap();

            if core.machine.current_state() == "Open"
                && (self.context.config.automatic_transition
                    || self.context.probe.load(Ordering::Acquire))
                && core.machine.handle(CircuitEvent::AttemptReset).is_ok()
            {
                self.enter_half_open(&mut core, &mut changes);
            }

            outcome = match core.machine.current_state() {
                "Open" => {
                    let opened_at = core.machine.open_data().map(|d| d.opened_at).unwrap_or(0.0);
                    Err(Rejection::Open { opened_at })
                }
                "HalfOpen" => {
                    let budget = self.context.config.half_open_permits;
                    let data = core
                        .machine
                        .half_open_data_mut()
                        .expect("HalfOpen state must have data");
                    if data.permitted_calls >= budget {
                        Err(Rejection::HalfOpenLimit)
                    } else {
                        data.permitted_calls += 1;
                        Ok(core.generation)
                    }
                }
                _ => Ok(core.generation),
            };
        }

        self.notify(&changes);
        if let Err(ref rejection) = outcome {
            tracing::debug!(circuit = %self.context.name, ?rejection, "call not permitted");
        }
        outcome
    }

    /// Record a classified outcome and re-evaluate transitions
    fn record_outcome(&self, generation: u64, success: bool, duration: f64) {
        let mut changes = Vec::new();
        {
            let mut core = self.core.lock().unwrap();

            // The breaker transitioned while the operation ran; this outcome
            // belongs to a window that no longer exists.
            if core.generation != generation {
                return;
            }

            let slow = duration >= self.context.config.slow_call_duration_secs;
            self.context
                .window
                .record(OutcomeKind::classify(success, slow), duration);

            if core.machine.current_state() == "HalfOpen"
                && let Some(data) = core.machine.half_open_data_mut()
            {
                data.recorded_outcomes += 1;
            }

            let from = state_from_name(core.machine.current_state());
            if core.machine.handle(CircuitEvent::Trip).is_ok() {
                self.enter_open(&mut core, from, &mut changes);
            } else if core.machine.current_state() == "HalfOpen"
                && core.machine.handle(CircuitEvent::Close).is_ok()
            {
                self.enter_closed(&mut core, &mut changes);
            }
        }

        self.notify(&changes);
    }

    /// Build the rejection result, dispatching to the fallback if present
    fn reject<T, E>(
        &self,
        rejection: Rejection,
        options: CallOptions<T, E>,
    ) -> Result<T, CircuitError<E>> {
        if let Some(fallback) = options.fallback {
            let ctx = FallbackContext {
                circuit_name: self.context.name.clone(),
                state: self.state(),
                rejected: true,
            };
            return fallback(&ctx).map_err(CircuitError::Execution);
        }

        Err(match rejection {
            Rejection::Open { opened_at } => CircuitError::Open {
                circuit: self.context.name.clone(),
                opened_at,
            },
            Rejection::HalfOpenLimit => CircuitError::HalfOpenLimitReached {
                circuit: self.context.name.clone(),
            },
        })
    }

    fn counts_as_failure<E: 'static>(&self, error: &E, duration: f64) -> bool {
        match &self.context.classifier {
            Some(classifier) => classifier.is_failure(&FailureContext {
                circuit_name: &self.context.name,
                error: error as &dyn Any,
                duration,
            }),
            None => true,
        }
    }

    /// Open-state bookkeeping after a committed trip
    fn enter_open(&self, core: &mut Core, from: CircuitState, changes: &mut Vec<StateChange>) {
        if let Some(data) = core.machine.open_data_mut() {
            data.opened_at = self.context.window.monotonic_time();
        }
        core.generation += 1;
        changes.push(StateChange {
            circuit: self.context.name.clone(),
            from,
            to: CircuitState::Open,
        });
    }

    /// Half-open bookkeeping: the trial batch starts from an empty window
    fn enter_half_open(&self, core: &mut Core, changes: &mut Vec<StateChange>) {
        self.context.probe.store(false, Ordering::Release);
        self.context.window.clear();
        core.generation += 1;
        changes.push(StateChange {
            circuit: self.context.name.clone(),
            from: CircuitState::Open,
            to: CircuitState::HalfOpen,
        });
    }

    /// Closed bookkeeping after a successful trial
    fn enter_closed(&self, core: &mut Core, changes: &mut Vec<StateChange>) {
        self.context.window.clear();
        core.generation += 1;
        changes.push(StateChange {
            circuit: self.context.name.clone(),
            from: CircuitState::HalfOpen,
            to: CircuitState::Closed,
        });
    }

    /// Fire observers outside the critical section
    fn notify(&self, changes: &[StateChange]) {
        for change in changes {
            tracing::info!(
                circuit = %change.circuit,
                from = %change.from,
                to = %change.to,
                "circuit state changed"
            );
            self.callbacks.notify(change);
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.context.name)
            .field("state", &self.state())
            .finish()
    }
}
