//! Registry validation

use crate::{BreakerSettings, DependencyKind, MonitorConfig};
use breakwater_core::{Error, Result};
use std::collections::HashSet;

/// Validate a registry. Called by the loader and again by the monitor at
/// construction time, so a hand-built config cannot bypass it.
pub fn validate(config: &MonitorConfig) -> Result<()> {
    if config.dependencies.is_empty() {
        tracing::warn!("Registry has no dependencies; every report will be vacuously healthy");
    }

    if config.cycle_interval.is_zero() {
        return Err(Error::config("cycle_interval must be > 0"));
    }

    validate_settings(&config.breaker, "registry")?;

    let mut seen = HashSet::new();
    for dependency in &config.dependencies {
        if dependency.id.is_empty() {
            return Err(Error::config("dependency id cannot be empty"));
        }

        if !seen.insert(dependency.id.as_str()) {
            return Err(Error::config(format!(
                "duplicate dependency id '{}'",
                dependency.id
            )));
        }

        validate_endpoint(dependency.kind, &dependency.id, &dependency.endpoint)?;

        if let Some(ref settings) = dependency.breaker {
            validate_settings(settings, &dependency.id)?;
        }
    }

    for id in config.degradation_messages.keys() {
        if !seen.contains(id.as_str()) {
            tracing::warn!(
                dependency = %id,
                "Degradation message configured for an unregistered dependency"
            );
        }
    }

    Ok(())
}

fn validate_endpoint(kind: DependencyKind, id: &str, endpoint: &str) -> Result<()> {
    if endpoint.is_empty() {
        return Err(Error::config(format!("dependency '{id}' endpoint cannot be empty")));
    }

    match kind {
        DependencyKind::Http => {
            let url = url::Url::parse(endpoint).map_err(|e| {
                Error::config(format!("dependency '{id}' has an invalid URL: {e}"))
            })?;
            match url.scheme() {
                "http" | "https" => Ok(()),
                other => Err(Error::config(format!(
                    "dependency '{id}' has unsupported scheme '{other}' (http or https required)"
                ))),
            }
        }
        DependencyKind::Tcp => {
            let port = endpoint
                .rsplit_once(':')
                .map(|(host, port)| (host, port.parse::<u16>()))
                .filter(|(host, _)| !host.is_empty());
            match port {
                Some((_, Ok(_))) => Ok(()),
                _ => Err(Error::config(format!(
                    "dependency '{id}' must use host:port for tcp checks"
                ))),
            }
        }
    }
}

fn validate_settings(settings: &BreakerSettings, scope: &str) -> Result<()> {
    if settings.failure_threshold == 0 {
        return Err(Error::config(format!(
            "failure_threshold must be > 0 ({scope})"
        )));
    }
    if settings.half_open_max_successes == 0 {
        return Err(Error::config(format!(
            "half_open_max_successes must be > 0 ({scope})"
        )));
    }
    if settings.probe_timeout.is_zero() {
        return Err(Error::config(format!("probe_timeout must be > 0 ({scope})")));
    }
    if settings.reset_timeout.is_zero() {
        return Err(Error::config(format!("reset_timeout must be > 0 ({scope})")));
    }
    Ok(())
}
