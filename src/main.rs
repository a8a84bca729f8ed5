//! rook-expansion-chaos - run one capacity-expansion trial under fault injection.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Reads trial configuration from `EXPANSION_TRIAL_*` environment variables
//! - Creates the Kubernetes client
//! - Optionally serves health endpoints and metrics
//! - Runs the trial and maps its verdict to the process exit code

use std::process::ExitCode;
use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tracing::{error, info};

use rook_expansion_chaos::health::{HealthState, run_health_server};
use rook_expansion_chaos::{TrialConfig, TrialParams, TrialVerdict, run_trial};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rook_expansion_chaos=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    info!("Starting rook-expansion-chaos");

    let config = TrialConfig::from_env()?;
    let params = TrialParams::from_env()?;

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let health_state = Arc::new(HealthState::new());
    if let Some(port) = config.metrics_port {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("Health server error: {}", e);
            }
        });
    }
    health_state.set_ready(true).await;

    let metrics = Some(health_state.metrics.clone());
    let verdict = tokio::select! {
        verdict = run_trial(client, config, &params, metrics) => verdict,
        _ = shutdown_signal() => {
            info!("Received shutdown signal, abandoning trial");
            return Ok(ExitCode::FAILURE);
        }
    };
    health_state.set_ready(false).await;

    match verdict {
        TrialVerdict::Passed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        TrialVerdict::Skipped(_) => Ok(ExitCode::SUCCESS),
        TrialVerdict::Failed(e) => {
            let failure = serde_json::json!({
                "reason": e.reason(),
                "message": e.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&failure)?);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the runner cannot shut down
/// gracefully without them.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
