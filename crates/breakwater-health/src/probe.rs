//! Bounded-time health probes against downstream dependencies

use async_trait::async_trait;
use breakwater_config::{DependencyConfig, DependencyKind};
use bytes::Bytes;
use http::{Method, StatusCode, Uri};
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// Why a probe failed.
///
/// The breaker treats all four identically; they stay distinct so the status
/// surface can say what actually went wrong.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// The probe did not resolve within its timeout
    #[error("timeout")]
    Timeout,

    /// Connection refused, unreachable host, DNS failure
    #[error("connection failed: {0}")]
    Connection(String),

    /// Non-2xx response, malformed payload, or payload missing `status`
    #[error("protocol error: {0}")]
    Protocol(String),

    /// 2xx response whose payload reports an unhealthy internal state
    #[error("dependency reported unhealthy: {0}")]
    Unhealthy(String),
}

/// Outcome of exactly one probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    /// Whether the dependency counts as healthy
    pub success: bool,
    /// Time the probe took, timeout included
    pub latency: Duration,
    /// Failure classification, present iff `success` is false
    pub error: Option<ProbeError>,
    /// Response payload returned by the dependency, if any
    pub evidence: Option<serde_json::Value>,
}

impl ProbeOutcome {
    /// Create a healthy outcome
    pub fn healthy(latency: Duration, evidence: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            latency,
            error: None,
            evidence,
        }
    }

    /// Create an unhealthy outcome
    pub fn unhealthy(latency: Duration, error: ProbeError) -> Self {
        Self {
            success: false,
            latency,
            error: Some(error),
            evidence: None,
        }
    }
}

/// Raw response handed back by a transport
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response body
    pub body: Bytes,
}

/// Transport used to reach a dependency's health endpoint.
///
/// Implementations report failures as [`ProbeError`] values; nothing is ever
/// thrown past this boundary. Timeout enforcement lives in [`HealthProbe`],
/// not here.
#[async_trait]
pub trait ProbeTransport: Send + Sync + fmt::Debug {
    /// Issue a single GET against an HTTP health endpoint
    async fn get_health(&self, url: &str) -> Result<ProbeResponse, ProbeError>;

    /// Open (and immediately drop) a TCP connection to `host:port`
    async fn connect(&self, addr: &str) -> Result<(), ProbeError>;
}

/// Production transport: plain HTTP client plus raw TCP connect
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, http_body_util::Empty<Bytes>>,
}

impl HttpTransport {
    /// Create a new transport
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeTransport for HttpTransport {
    async fn get_health(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| ProbeError::Protocol(format!("invalid health URL: {e}")))?;

        let req = http::Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(http_body_util::Empty::<Bytes>::new())
            .map_err(|e| ProbeError::Protocol(format!("failed to build request: {e}")))?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| ProbeError::Connection(e.to_string()))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ProbeError::Protocol(format!("failed to read body: {e}")))?
            .to_bytes();

        Ok(ProbeResponse { status, body })
    }

    async fn connect(&self, addr: &str) -> Result<(), ProbeError> {
        TcpStream::connect(addr)
            .await
            .map(drop)
            .map_err(|e| ProbeError::Connection(e.to_string()))
    }
}

/// Performs exactly one bounded-time health check per call.
///
/// Never retries and never blocks past the given timeout; retry policy
/// belongs to the breaker and the monitor cycle.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    transport: Arc<dyn ProbeTransport>,
}

impl HealthProbe {
    /// Create a probe over an injected transport
    pub fn new(transport: Arc<dyn ProbeTransport>) -> Self {
        Self { transport }
    }

    /// Run one health check against a dependency
    pub async fn execute(
        &self,
        dependency: &DependencyConfig,
        probe_timeout: Duration,
    ) -> ProbeOutcome {
        let start = Instant::now();

        debug!(
            dependency = %dependency.id,
            endpoint = %dependency.endpoint,
            "Probing dependency"
        );

        let outcome = match timeout(probe_timeout, self.check(dependency)).await {
            Ok(Ok(evidence)) => ProbeOutcome::healthy(start.elapsed(), evidence),
            Ok(Err(error)) => ProbeOutcome::unhealthy(start.elapsed(), error),
            Err(_) => ProbeOutcome::unhealthy(start.elapsed(), ProbeError::Timeout),
        };

        if let Some(ref error) = outcome.error {
            warn!(
                dependency = %dependency.id,
                error = %error,
                latency_ms = outcome.latency.as_millis() as u64,
                "Probe failed"
            );
        }

        outcome
    }

    async fn check(
        &self,
        dependency: &DependencyConfig,
    ) -> Result<Option<serde_json::Value>, ProbeError> {
        match dependency.kind {
            DependencyKind::Http => {
                let response = self.transport.get_health(&dependency.endpoint).await?;
                interpret_http_response(&response)
            }
            DependencyKind::Tcp => {
                self.transport.connect(&dependency.endpoint).await?;
                Ok(None)
            }
        }
    }
}

/// Decide health from an HTTP response.
///
/// A 2xx alone is not enough: the payload must be JSON with a `status` field,
/// and that field must say "healthy".
fn interpret_http_response(
    response: &ProbeResponse,
) -> Result<Option<serde_json::Value>, ProbeError> {
    if !response.status.is_success() {
        return Err(ProbeError::Protocol(format!(
            "unexpected status code: {}",
            response.status
        )));
    }

    let payload: serde_json::Value = serde_json::from_slice(&response.body)
        .map_err(|e| ProbeError::Protocol(format!("malformed health payload: {e}")))?;

    match payload.get("status").and_then(|s| s.as_str()) {
        Some("healthy") => Ok(Some(payload)),
        Some(reported) => Err(ProbeError::Unhealthy(format!("status is {reported:?}"))),
        None => Err(ProbeError::Protocol(
            "health payload missing \"status\" field".to_string(),
        )),
    }
}
