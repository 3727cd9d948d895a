//! Gateway-wide health status and reporting

use crate::circuit_breaker::BreakerSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Last observed health of one dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Dependency is healthy
    Healthy,
    /// Dependency is unhealthy
    Unhealthy,
    /// Dependency has not been probed yet
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Aggregate gateway health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    /// Every dependency is healthy
    Healthy,
    /// Some, but not all, dependencies are healthy
    Degraded,
    /// No dependency is healthy
    Critical,
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayStatus::Healthy => write!(f, "healthy"),
            GatewayStatus::Degraded => write!(f, "degraded"),
            GatewayStatus::Critical => write!(f, "critical"),
        }
    }
}

impl GatewayStatus {
    /// Aggregate per-dependency statuses. Unknown counts as not-healthy.
    pub fn aggregate(statuses: impl IntoIterator<Item = HealthStatus>) -> (Self, usize, usize) {
        let mut healthy = 0;
        let mut total = 0;
        for status in statuses {
            total += 1;
            if status == HealthStatus::Healthy {
                healthy += 1;
            }
        }

        let overall = if healthy == total {
            GatewayStatus::Healthy
        } else if healthy == 0 {
            GatewayStatus::Critical
        } else {
            GatewayStatus::Degraded
        };

        (overall, healthy, total)
    }
}

/// Last-known state of one dependency, updated on every resolved probe
#[derive(Debug, Clone, Serialize)]
pub struct DependencyStatus {
    /// Last observed health
    pub last_observed: HealthStatus,
    /// When the dependency was last actually probed
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Error from the most recent failed probe
    pub last_error: Option<String>,
    /// Latency of the most recent probe
    #[serde(with = "humantime_serde")]
    pub last_latency: Option<Duration>,
}

impl DependencyStatus {
    /// Status before the first probe has resolved
    pub fn unknown() -> Self {
        Self {
            last_observed: HealthStatus::Unknown,
            last_checked_at: None,
            last_error: None,
            last_latency: None,
        }
    }
}

/// One dependency's row in the gateway report
#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    /// Last observed health
    pub status: HealthStatus,
    /// Breaker view at report time
    pub circuit_breaker: BreakerSnapshot,
    /// When the dependency was last actually probed
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Error from the most recent failed probe
    pub last_error: Option<String>,
    /// Latency of the most recent probe
    #[serde(with = "humantime_serde")]
    pub last_latency: Option<Duration>,
}

/// Point-in-time view of every dependency and the aggregate gateway health.
///
/// Produced fresh each cycle and never mutated afterwards; only the most
/// recent report is retained.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayHealthReport {
    /// Aggregate gateway health
    pub overall_health: GatewayStatus,
    /// Number of dependencies currently observed healthy
    pub healthy_count: usize,
    /// Number of registered dependencies
    pub total_count: usize,
    /// Per-dependency rows, keyed by dependency id
    pub services: BTreeMap<String, ServiceReport>,
    /// When this report was computed
    pub timestamp: DateTime<Utc>,
}

impl GatewayHealthReport {
    /// Build a report from per-dependency rows
    pub fn new(services: BTreeMap<String, ServiceReport>) -> Self {
        let (overall_health, healthy_count, total_count) =
            GatewayStatus::aggregate(services.values().map(|s| s.status));

        Self {
            overall_health,
            healthy_count,
            total_count,
            services,
            timestamp: Utc::now(),
        }
    }
}
