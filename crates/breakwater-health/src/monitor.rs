//! The gateway health monitor: breaker-gated concurrent probing cycles

use crate::circuit_breaker::CircuitBreaker;
use crate::probe::{HealthProbe, ProbeOutcome, ProbeTransport};
use crate::report::{DependencyStatus, GatewayHealthReport, HealthStatus, ServiceReport};
use breakwater_config::{DependencyConfig, MonitorConfig};
use breakwater_core::{Error, Result};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Breakers and last-known statuses, one entry per registered dependency.
///
/// Guarded by a single mutex that is never held across an await: the cycle
/// locks once to gate dispatch, releases while probes run, and locks again
/// to apply outcomes.
#[derive(Debug)]
struct MonitorState {
    breakers: HashMap<String, CircuitBreaker>,
    statuses: HashMap<String, DependencyStatus>,
}

/// Owns one circuit breaker and one status row per registered dependency,
/// runs the periodic probing cycle, and aggregates gateway-wide health.
///
/// Explicitly constructed and passed to whatever hosts it; there is no
/// process-wide instance. At most one cycle is ever in flight: the next one
/// is scheduled only after the previous has fully resolved, so each breaker
/// is only ever touched from the cycle that owns it.
#[derive(Debug)]
pub struct HealthMonitor {
    config: MonitorConfig,
    probe: HealthProbe,
    state: Mutex<MonitorState>,
    latest: RwLock<Option<Arc<GatewayHealthReport>>>,
    running: AtomicBool,
    shutdown: CancellationToken,
}

impl HealthMonitor {
    /// Create a monitor over a validated registry.
    ///
    /// Fails fast on a malformed registry rather than at probe time.
    pub fn new(config: MonitorConfig, transport: Arc<dyn ProbeTransport>) -> Result<Self> {
        breakwater_config::validate(&config)?;

        let mut breakers = HashMap::new();
        let mut statuses = HashMap::new();
        for dependency in &config.dependencies {
            breakers.insert(
                dependency.id.clone(),
                CircuitBreaker::new(dependency.id.clone(), config.effective_settings(dependency)),
            );
            statuses.insert(dependency.id.clone(), DependencyStatus::unknown());
        }

        Ok(Self {
            probe: HealthProbe::new(transport),
            config,
            state: Mutex::new(MonitorState { breakers, statuses }),
            latest: RwLock::new(None),
            running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    /// Execute exactly one probing cycle and return the resulting report.
    ///
    /// Dependencies whose breaker denies execution are skipped entirely (no
    /// network call) and keep their last observed status. All admitted probes
    /// run concurrently; the aggregate is only computed once every one of
    /// them has resolved.
    pub async fn run_once(&self) -> Arc<GatewayHealthReport> {
        let admitted: Vec<(DependencyConfig, Duration)> = {
            let mut state = self.state.lock();
            self.config
                .dependencies
                .iter()
                .filter(|dependency| {
                    let allowed = state
                        .breakers
                        .get_mut(&dependency.id)
                        .map(CircuitBreaker::can_execute)
                        .unwrap_or(false);
                    if !allowed {
                        debug!(
                            dependency = %dependency.id,
                            "Skipping probe, circuit breaker denies execution"
                        );
                    }
                    allowed
                })
                .map(|dependency| {
                    let timeout = self.config.effective_settings(dependency).probe_timeout;
                    (dependency.clone(), timeout)
                })
                .collect()
        };

        debug!(
            admitted = admitted.len(),
            total = self.config.dependencies.len(),
            "Starting probe cycle"
        );

        // Fan-out: all admitted probes in flight at once. The join below is
        // the cycle barrier, so cycle latency is bounded by the slowest
        // probe's timeout, not the sum.
        let probes = admitted.into_iter().map(|(dependency, timeout)| {
            let probe = self.probe.clone();
            async move {
                let outcome = probe.execute(&dependency, timeout).await;
                (dependency.id, outcome)
            }
        });
        let outcomes = futures::future::join_all(probes).await;

        let report = {
            let mut state = self.state.lock();
            for (id, outcome) in outcomes {
                self.apply_outcome(&mut state, &id, outcome);
            }
            self.build_report(&state)
        };

        let report = Arc::new(report);
        *self.latest.write() = Some(Arc::clone(&report));

        info!(
            overall = %report.overall_health,
            healthy = report.healthy_count,
            total = report.total_count,
            "Probe cycle complete"
        );

        report
    }

    /// Spawn the periodic probing loop.
    ///
    /// Errors on double-start and on a monitor that has already been stopped.
    pub fn start(self: Arc<Self>) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::monitor("monitor has been stopped"));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::monitor("monitor is already running"));
        }

        tokio::spawn(self.run_loop());
        Ok(())
    }

    /// Signal the loop to exit after the in-flight cycle completes.
    ///
    /// Idempotent. Probes are never force-cancelled mid-flight; worst-case
    /// exit latency is bounded by the per-probe timeouts.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Whether the periodic loop is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Most recently computed report, without triggering a new cycle
    pub fn get_report(&self) -> Option<Arc<GatewayHealthReport>> {
        self.latest.read().clone()
    }

    /// User-facing message for a degraded dependency: the configured text,
    /// or a generic fallback when none is configured
    pub fn get_degradation_message(&self, dependency_id: &str) -> String {
        self.config
            .degradation_messages
            .get(dependency_id)
            .cloned()
            .unwrap_or_else(|| {
                format!("{dependency_id} temporarily offline. Some functionality may be limited.")
            })
    }

    async fn run_loop(self: Arc<Self>) {
        info!(
            dependencies = self.config.dependencies.len(),
            interval = ?self.config.cycle_interval,
            "Health monitor started"
        );

        loop {
            // A panic out of the cycle is a programming error in the
            // scheduling/aggregation logic; log it and retry on the next
            // interval instead of leaving the loop dead.
            if let Err(panic) = AssertUnwindSafe(self.run_once()).catch_unwind().await {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(panic = %message, "Probe cycle panicked; retrying next interval");
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(self.config.cycle_interval) => {}
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Health monitor stopped");
    }

    fn apply_outcome(&self, state: &mut MonitorState, id: &str, outcome: ProbeOutcome) {
        if let Some(breaker) = state.breakers.get_mut(id) {
            if outcome.success {
                breaker.record_success();
            } else {
                breaker.record_failure();
            }
        }

        if let Some(status) = state.statuses.get_mut(id) {
            status.last_observed = if outcome.success {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            };
            status.last_checked_at = Some(Utc::now());
            status.last_error = outcome.error.map(|e| e.to_string());
            status.last_latency = Some(outcome.latency);
        }
    }

    fn build_report(&self, state: &MonitorState) -> GatewayHealthReport {
        let services: BTreeMap<String, ServiceReport> = self
            .config
            .dependencies
            .iter()
            .filter_map(|dependency| {
                let breaker = state.breakers.get(&dependency.id)?;
                let status = state.statuses.get(&dependency.id)?;
                Some((
                    dependency.id.clone(),
                    ServiceReport {
                        status: status.last_observed,
                        circuit_breaker: breaker.snapshot(),
                        last_checked_at: status.last_checked_at,
                        last_error: status.last_error.clone(),
                        last_latency: status.last_latency,
                    },
                ))
            })
            .collect();

        GatewayHealthReport::new(services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::probe::{ProbeError, ProbeResponse};
    use crate::report::GatewayStatus;
    use async_trait::async_trait;
    use breakwater_config::{BreakerSettings, DependencyKind};
    use bytes::Bytes;
    use http::StatusCode;
    use tokio::time::{advance, Instant};

    /// What a mock endpoint does when probed
    #[derive(Debug, Clone)]
    enum Behavior {
        Healthy,
        Reported(&'static str),
        Refuse,
        Hang,
    }

    /// Per-endpoint scripted transport that counts invocations
    #[derive(Debug, Default)]
    struct MockTransport {
        behaviors: Mutex<HashMap<String, Behavior>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn set(&self, url: &str, behavior: Behavior) {
            self.behaviors.lock().insert(url.to_string(), behavior);
        }

        fn calls_for(&self, url: &str) -> usize {
            self.calls.lock().iter().filter(|c| *c == url).count()
        }
    }

    #[async_trait]
    impl ProbeTransport for MockTransport {
        async fn get_health(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
            self.calls.lock().push(url.to_string());
            let behavior = self.behaviors.lock().get(url).cloned();
            match behavior {
                Some(Behavior::Healthy) => Ok(ProbeResponse {
                    status: StatusCode::OK,
                    body: Bytes::from_static(br#"{"status":"healthy"}"#),
                }),
                Some(Behavior::Reported(status)) => Ok(ProbeResponse {
                    status: StatusCode::OK,
                    body: Bytes::from(format!(r#"{{"status":"{status}"}}"#)),
                }),
                Some(Behavior::Refuse) | None => {
                    Err(ProbeError::Connection("connection refused".to_string()))
                }
                Some(Behavior::Hang) => futures::future::pending().await,
            }
        }

        async fn connect(&self, addr: &str) -> Result<(), ProbeError> {
            self.get_health(addr).await.map(drop)
        }
    }

    fn url(id: &str) -> String {
        format!("http://{id}:8080/health")
    }

    fn registry(ids: &[&str], settings: BreakerSettings) -> MonitorConfig {
        MonitorConfig {
            dependencies: ids
                .iter()
                .map(|id| DependencyConfig {
                    id: id.to_string(),
                    endpoint: url(id),
                    kind: DependencyKind::Http,
                    breaker: None,
                })
                .collect(),
            breaker: settings,
            cycle_interval: Duration::from_secs(30),
            degradation_messages: HashMap::new(),
        }
    }

    fn settings(failure_threshold: u32, half_open_max: u32) -> BreakerSettings {
        BreakerSettings {
            failure_threshold,
            probe_timeout: Duration::from_secs(10),
            reset_timeout: Duration::from_secs(60),
            half_open_max_successes: half_open_max,
        }
    }

    fn monitor_with(
        ids: &[&str],
        breaker: BreakerSettings,
    ) -> (Arc<HealthMonitor>, Arc<MockTransport>) {
        let transport = MockTransport::new();
        for id in ids {
            transport.set(&url(id), Behavior::Healthy);
        }
        let dyn_transport: Arc<dyn ProbeTransport> = transport.clone();
        let monitor = HealthMonitor::new(registry(ids, breaker), dyn_transport).unwrap();
        (Arc::new(monitor), transport)
    }

    #[tokio::test]
    async fn test_all_healthy_cycle() {
        let (monitor, _transport) = monitor_with(&["auth", "billing", "search"], settings(3, 2));

        let report = monitor.run_once().await;

        assert_eq!(report.overall_health, GatewayStatus::Healthy);
        assert_eq!(report.healthy_count, 3);
        assert_eq!(report.total_count, 3);

        let billing = &report.services["billing"];
        assert_eq!(billing.status, HealthStatus::Healthy);
        assert_eq!(billing.circuit_breaker.state, CircuitState::Closed);
        assert!(billing.last_checked_at.is_some());
        assert!(billing.last_latency.is_some());
        assert!(billing.last_error.is_none());
    }

    #[tokio::test]
    async fn test_one_failing_dependency_degrades_gateway() {
        let (monitor, transport) = monitor_with(&["auth", "billing", "search"], settings(3, 2));
        transport.set(&url("billing"), Behavior::Refuse);

        let report = monitor.run_once().await;

        assert_eq!(report.overall_health, GatewayStatus::Degraded);
        assert_eq!(report.healthy_count, 2);
        let billing = &report.services["billing"];
        assert_eq!(billing.status, HealthStatus::Unhealthy);
        assert!(billing.last_error.as_deref().unwrap().contains("connection"));
    }

    #[tokio::test]
    async fn test_no_healthy_dependency_is_critical() {
        let (monitor, transport) = monitor_with(&["auth", "billing"], settings(3, 2));
        transport.set(&url("auth"), Behavior::Refuse);
        transport.set(&url("billing"), Behavior::Reported("draining"));

        let report = monitor.run_once().await;

        assert_eq!(report.overall_health, GatewayStatus::Critical);
        assert_eq!(report.healthy_count, 0);
    }

    #[tokio::test]
    async fn test_open_breaker_suppresses_network_calls() {
        let (monitor, transport) = monitor_with(&["auth", "billing"], settings(3, 2));
        transport.set(&url("billing"), Behavior::Refuse);

        // Three failing cycles open billing's breaker
        for _ in 0..3 {
            monitor.run_once().await;
        }
        assert_eq!(transport.calls_for(&url("billing")), 3);

        let report = monitor.run_once().await;

        // billing was skipped entirely, auth still probed
        assert_eq!(transport.calls_for(&url("billing")), 3);
        assert_eq!(transport.calls_for(&url("auth")), 4);

        let billing = &report.services["billing"];
        assert_eq!(billing.circuit_breaker.state, CircuitState::Open);
        assert!(!billing.circuit_breaker.can_execute);
        // Last observed status survives the skipped cycle
        assert_eq!(billing.status, HealthStatus::Unhealthy);
        assert!(billing.last_error.as_deref().unwrap().contains("connection"));
        assert_eq!(report.overall_health, GatewayStatus::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_row_untouched_while_skipped() {
        let (monitor, transport) = monitor_with(&["auth", "billing"], settings(1, 2));
        transport.set(&url("billing"), Behavior::Refuse);

        let first = monitor.run_once().await;
        let checked_at = first.services["billing"].last_checked_at;

        advance(Duration::from_secs(5)).await;
        let second = monitor.run_once().await;

        // Skipped: timestamp frozen at the last real probe
        assert_eq!(second.services["billing"].last_checked_at, checked_at);
        assert_ne!(
            second.services["auth"].last_checked_at,
            first.services["auth"].last_checked_at
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_timeout_admits_single_trial_probe() {
        let (monitor, transport) = monitor_with(&["auth", "billing"], settings(3, 2));
        transport.set(&url("billing"), Behavior::Refuse);

        for _ in 0..3 {
            monitor.run_once().await;
        }
        assert_eq!(transport.calls_for(&url("billing")), 3);

        // Dependency recovers while the breaker is open
        transport.set(&url("billing"), Behavior::Healthy);

        advance(Duration::from_secs(61)).await;
        let report = monitor.run_once().await;

        // Exactly one trial probe went through
        assert_eq!(transport.calls_for(&url("billing")), 4);
        let billing = &report.services["billing"];
        assert_eq!(billing.circuit_breaker.state, CircuitState::HalfOpen);
        assert_eq!(billing.status, HealthStatus::Healthy);

        // A second successful trial closes the breaker (half_open_max = 2)
        let report = monitor.run_once().await;
        assert_eq!(
            report.services["billing"].circuit_breaker.state,
            CircuitState::Closed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_duration_bounded_by_slowest_probe() {
        let (monitor, transport) = monitor_with(&["auth", "billing", "search"], settings(3, 2));
        transport.set(&url("auth"), Behavior::Hang);
        transport.set(&url("billing"), Behavior::Hang);
        transport.set(&url("search"), Behavior::Hang);

        let start = Instant::now();
        let report = monitor.run_once().await;
        let elapsed = start.elapsed();

        // Concurrent dispatch: one probe-timeout total, not three
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(11));

        assert_eq!(report.overall_health, GatewayStatus::Critical);
        for service in report.services.values() {
            assert_eq!(service.last_error.as_deref(), Some("timeout"));
        }
    }

    #[tokio::test]
    async fn test_get_report_returns_cached_without_new_cycle() {
        let (monitor, transport) = monitor_with(&["auth"], settings(3, 2));

        assert!(monitor.get_report().is_none());

        monitor.run_once().await;
        let report = monitor.get_report().unwrap();
        assert_eq!(report.overall_health, GatewayStatus::Healthy);
        assert_eq!(transport.calls_for(&url("auth")), 1);

        // Reading the report again does not probe
        let _ = monitor.get_report().unwrap();
        assert_eq!(transport.calls_for(&url("auth")), 1);
    }

    #[tokio::test]
    async fn test_empty_registry_reports_healthy() {
        let (monitor, _transport) = monitor_with(&[], settings(3, 2));
        let report = monitor.run_once().await;
        assert_eq!(report.overall_health, GatewayStatus::Healthy);
        assert_eq!(report.total_count, 0);
    }

    #[tokio::test]
    async fn test_degradation_message_fallback() {
        let mut config = registry(&["auth", "billing"], settings(3, 2));
        config
            .degradation_messages
            .insert("billing".to_string(), "Invoicing is paused.".to_string());
        let transport: Arc<dyn ProbeTransport> = MockTransport::new();
        let monitor = HealthMonitor::new(config, transport).unwrap();

        assert_eq!(monitor.get_degradation_message("billing"), "Invoicing is paused.");
        assert_eq!(
            monitor.get_degradation_message("auth"),
            "auth temporarily offline. Some functionality may be limited."
        );
    }

    #[tokio::test]
    async fn test_construction_rejects_malformed_registry() {
        let mut config = registry(&["auth"], settings(3, 2));
        config.dependencies[0].endpoint = "not a url".to_string();
        let transport: Arc<dyn ProbeTransport> = MockTransport::new();
        assert!(HealthMonitor::new(config, transport).is_err());

        let config = registry(&["auth", "auth"], settings(3, 2));
        let transport: Arc<dyn ProbeTransport> = MockTransport::new();
        assert!(HealthMonitor::new(config, transport).is_err());
    }

    #[tokio::test]
    async fn test_start_rejects_double_start() {
        let (monitor, _transport) = monitor_with(&["auth"], settings(3, 2));

        Arc::clone(&monitor).start().unwrap();
        assert!(Arc::clone(&monitor).start().is_err());

        monitor.stop();
        // Idempotent
        monitor.stop();
    }

    #[tokio::test]
    async fn test_start_stop_loop() {
        let mut config = registry(&["auth"], settings(3, 2));
        config.cycle_interval = Duration::from_millis(10);
        let transport = MockTransport::new();
        transport.set(&url("auth"), Behavior::Healthy);
        let dyn_transport: Arc<dyn ProbeTransport> = transport.clone();
        let monitor = Arc::new(HealthMonitor::new(config, dyn_transport).unwrap());

        Arc::clone(&monitor).start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(monitor.is_running());
        assert!(monitor.get_report().is_some());
        assert!(transport.calls_for(&url("auth")) >= 2);

        monitor.stop();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!monitor.is_running());

        // Once stopped, the monitor stays stopped
        assert!(Arc::clone(&monitor).start().is_err());
        let calls_after_stop = transport.calls_for(&url("auth"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.calls_for(&url("auth")), calls_after_stop);
    }
}
