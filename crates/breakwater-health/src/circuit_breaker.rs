//! Circuit breaker pattern implementation

use breakwater_config::BreakerSettings;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Circuit is closed, probes pass through normally
    Closed,
    /// Circuit is open, no probes are issued
    Open,
    /// Circuit is half-open, allowing limited trial probes
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker for a single dependency.
///
/// Pure state machine: no I/O, no interior mutability. Exclusively owned by
/// the monitor, which routes every mutation through its own cycle step, so
/// `&mut self` is the whole synchronization story.
#[derive(Debug)]
pub struct CircuitBreaker {
    dependency_id: String,
    settings: BreakerSettings,
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    half_open_probe_count: u32,
}

impl CircuitBreaker {
    /// Create a new breaker in the closed state
    pub fn new(dependency_id: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            dependency_id: dependency_id.into(),
            settings,
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            half_open_probe_count: 0,
        }
    }

    /// Dependency this breaker guards
    pub fn dependency_id(&self) -> &str {
        &self.dependency_id
    }

    /// Get the current state
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Failure count accumulated while closed
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Decide whether a probe attempt is currently permitted.
    ///
    /// While open, the first call that finds the reset timeout elapsed
    /// transitions to half-open and claims the trial probe for its caller.
    pub fn can_execute(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => match self.last_failure_time {
                Some(last) if last.elapsed() >= self.settings.reset_timeout => {
                    self.transition_to_half_open();
                    true
                }
                _ => false,
            },
            CircuitState::HalfOpen => {
                self.half_open_probe_count < self.settings.half_open_max_successes
            }
        }
    }

    /// Record a successful probe outcome
    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = self.failure_count.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                self.half_open_probe_count += 1;
                if self.half_open_probe_count >= self.settings.half_open_max_successes {
                    self.transition_to_closed();
                }
            }
            // No probe should resolve while open; a stale outcome must not
            // corrupt the machine.
            CircuitState::Open => {}
        }

        debug!(
            dependency = %self.dependency_id,
            state = %self.state,
            failures = self.failure_count,
            "Circuit breaker recorded success"
        );
    }

    /// Record a failed probe outcome
    pub fn record_failure(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                self.last_failure_time = Some(Instant::now());
                if self.failure_count >= self.settings.failure_threshold {
                    self.transition_to_open();
                }
            }
            // Any single half-open failure reopens the circuit
            CircuitState::HalfOpen => {
                self.last_failure_time = Some(Instant::now());
                self.transition_to_open();
            }
            // A stale outcome while open must not extend the reset window
            CircuitState::Open => {}
        }

        warn!(
            dependency = %self.dependency_id,
            state = %self.state,
            failures = self.failure_count,
            "Circuit breaker recorded failure"
        );
    }

    /// Non-mutating snapshot for reports.
    ///
    /// `can_execute` here is a peek: an open breaker past its reset timeout
    /// reports `true` without transitioning, so report generation never
    /// consumes the half-open trial slot.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let can_execute = match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => self
                .last_failure_time
                .is_some_and(|last| last.elapsed() >= self.settings.reset_timeout),
            CircuitState::HalfOpen => {
                self.half_open_probe_count < self.settings.half_open_max_successes
            }
        };

        BreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            can_execute,
        }
    }

    fn transition_to_open(&mut self) {
        self.state = CircuitState::Open;
        warn!(
            dependency = %self.dependency_id,
            "Circuit breaker transitioned to OPEN"
        );
    }

    fn transition_to_half_open(&mut self) {
        self.state = CircuitState::HalfOpen;
        self.half_open_probe_count = 0;
        info!(
            dependency = %self.dependency_id,
            "Circuit breaker transitioned to HALF-OPEN"
        );
    }

    fn transition_to_closed(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.half_open_probe_count = 0;
        info!(
            dependency = %self.dependency_id,
            "Circuit breaker transitioned to CLOSED"
        );
    }
}

/// Point-in-time view of one breaker, embedded in the gateway report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    /// Current state
    pub state: CircuitState,
    /// Failure count accumulated while closed
    pub failure_count: u32,
    /// Whether a probe would currently be admitted
    pub can_execute: bool,
}
