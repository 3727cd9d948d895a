//! # Breakwater Health System
//!
//! Circuit-breaker-guarded health monitoring for a service gateway:
//! - Per-dependency circuit breaker (closed / open / half-open)
//! - Bounded-time health probes (HTTP with payload inspection, TCP connect)
//! - Concurrent per-cycle probing with a fan-in barrier
//! - Gateway-wide status aggregation and degradation messages

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod circuit_breaker;
pub mod monitor;
pub mod probe;
pub mod report;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use monitor::HealthMonitor;
pub use probe::{
    HealthProbe, HttpTransport, ProbeError, ProbeOutcome, ProbeResponse, ProbeTransport,
};
pub use report::{DependencyStatus, GatewayHealthReport, GatewayStatus, HealthStatus, ServiceReport};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
    pub use crate::monitor::HealthMonitor;
    pub use crate::probe::{
        HealthProbe, HttpTransport, ProbeError, ProbeOutcome, ProbeResponse, ProbeTransport,
    };
    pub use crate::report::{
        DependencyStatus, GatewayHealthReport, GatewayStatus, HealthStatus, ServiceReport,
    };
}
