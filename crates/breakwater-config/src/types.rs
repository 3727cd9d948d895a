//! Registry types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// The dependency registry: everything the health monitor needs to know
/// about its downstreams. Read-only after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    /// Downstream dependencies to monitor
    #[serde(default)]
    pub dependencies: Vec<DependencyConfig>,

    /// Gateway-wide breaker thresholds, overridable per dependency
    #[serde(default)]
    pub breaker: BreakerSettings,

    /// Interval between probing cycles
    #[serde(default = "default_cycle_interval", with = "humantime_serde")]
    pub cycle_interval: Duration,

    /// User-facing degradation message per dependency id
    #[serde(default)]
    pub degradation_messages: HashMap<String, String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            dependencies: Vec::new(),
            breaker: BreakerSettings::default(),
            cycle_interval: default_cycle_interval(),
            degradation_messages: HashMap::new(),
        }
    }
}

impl MonitorConfig {
    /// Breaker settings effective for one dependency: its own override if
    /// present, the gateway-wide settings otherwise
    pub fn effective_settings(&self, dependency: &DependencyConfig) -> BreakerSettings {
        dependency.breaker.clone().unwrap_or_else(|| self.breaker.clone())
    }
}

/// One downstream dependency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyConfig {
    /// Stable identifier, unique within the registry
    pub id: String,

    /// Health check endpoint: a URL for `http`, a `host:port` for `tcp`
    pub endpoint: String,

    /// Kind of health check to run
    #[serde(default)]
    pub kind: DependencyKind,

    /// Per-dependency breaker override
    #[serde(default)]
    pub breaker: Option<BreakerSettings>,
}

/// Kind of health check a dependency supports
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// GET the endpoint, expect a 2xx with a JSON `status` field
    #[default]
    Http,
    /// Open a TCP connection to `host:port`
    Tcp,
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Consecutive failures (while closed) required to open the breaker
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Upper bound on a single probe, including connect time
    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Minimum time an open breaker waits before allowing a half-open trial
    #[serde(default = "default_reset_timeout", with = "humantime_serde")]
    pub reset_timeout: Duration,

    /// Consecutive half-open successes required to close the breaker again
    #[serde(default = "default_half_open_max_successes")]
    pub half_open_max_successes: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            probe_timeout: default_probe_timeout(),
            reset_timeout: default_reset_timeout(),
            half_open_max_successes: default_half_open_max_successes(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_reset_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_half_open_max_successes() -> u32 {
    3
}

fn default_cycle_interval() -> Duration {
    Duration::from_secs(30)
}
