//! Breakwater CLI

use anyhow::Result;
use breakwater_health::{GatewayStatus, HealthMonitor, HealthStatus, HttpTransport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "breakwater")]
#[command(about = "Circuit-breaker-guarded health monitoring for service gateways", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one probing cycle and print the report as JSON
    Check {
        /// Path to the registry file
        #[arg(short, long, default_value = "registry.yaml")]
        config: PathBuf,

        /// Log level (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "warn")]
        log_level: String,
    },

    /// Probe on the configured interval until interrupted
    Watch {
        /// Path to the registry file
        #[arg(short, long, default_value = "registry.yaml")]
        config: PathBuf,

        /// Log level (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info")]
        log_level: String,
    },

    /// Validate a registry file
    Validate {
        /// Path to the registry file
        #[arg(short, long, default_value = "registry.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config, log_level } => {
            init_tracing(&log_level)?;

            let registry = breakwater_config::load(config)?;
            let monitor = HealthMonitor::new(registry, Arc::new(HttpTransport::new()))?;

            let report = monitor.run_once().await;
            println!("{}", serde_json::to_string_pretty(&*report)?);

            for (id, service) in &report.services {
                if service.status != HealthStatus::Healthy {
                    tracing::warn!(
                        dependency = %id,
                        "{}",
                        monitor.get_degradation_message(id)
                    );
                }
            }

            if report.overall_health != GatewayStatus::Healthy {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Watch { config, log_level } => {
            init_tracing(&log_level)?;

            tracing::info!("Starting Breakwater health monitor");
            tracing::info!("Registry file: {}", config.display());

            let registry = breakwater_config::load(config)?;
            tracing::info!(
                dependencies = registry.dependencies.len(),
                interval = ?registry.cycle_interval,
                "Registry loaded"
            );

            let monitor = Arc::new(HealthMonitor::new(registry, Arc::new(HttpTransport::new()))?);
            Arc::clone(&monitor).start()?;

            tokio::signal::ctrl_c().await?;
            tracing::info!("Received Ctrl+C, stopping after the in-flight cycle");
            monitor.stop();

            while monitor.is_running() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }

            tracing::info!("Monitor stopped");
            Ok(())
        }

        Commands::Validate { config } => {
            tracing_subscriber::fmt().with_target(false).init();

            tracing::info!("Validating registry: {}", config.display());

            match breakwater_config::load(&config) {
                Ok(registry) => {
                    tracing::info!("✓ Registry is valid");
                    tracing::info!("  Dependencies: {}", registry.dependencies.len());
                    tracing::info!("  Cycle interval: {:?}", registry.cycle_interval);
                    tracing::info!(
                        "  Degradation messages: {}",
                        registry.degradation_messages.len()
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("✗ Registry validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true),
        )
        .with(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(filter.into()),
        )
        .init();

    Ok(())
}
