//! rook-expansion-chaos library crate
//!
//! Expands a Rook/Ceph storage cluster while killing control-plane or
//! data-plane pods, then checks the cluster converges and reports healthy.
//!
//! The engine lives in [`trial`]; [`platform`] defines the interfaces it drives
//! and their Kubernetes implementation.

pub mod config;
pub mod crd;
pub mod error;
pub mod health;
pub mod platform;
pub mod trial;

pub use config::{KillMode, TrialConfig, TrialParams};
pub use error::{Result, TrialError};
pub use health::{HealthState, TrialMetrics};
pub use platform::{KubeCluster, ResourceClass};
pub use trial::{ExpansionTrial, TrialReport};

use std::sync::Arc;

use kube::Client;
use tracing::{error, info, warn};

/// How a trial ended, from the harness's point of view.
#[derive(Debug)]
pub enum TrialVerdict {
    Passed(Box<TrialReport>),
    Skipped(String),
    Failed(TrialError),
}

impl TrialVerdict {
    pub fn from_result(result: Result<TrialReport>) -> Self {
        match result {
            Ok(report) => TrialVerdict::Passed(Box::new(report)),
            Err(TrialError::PreconditionNotMet(reason)) => TrialVerdict::Skipped(reason),
            Err(e) => TrialVerdict::Failed(e),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TrialVerdict::Failed(_))
    }
}

/// Run a single trial against the cluster behind `client`.
///
/// This is the harness entry point used by the binary and the integration tests.
pub async fn run_trial(
    client: Client,
    config: TrialConfig,
    params: &TrialParams,
    metrics: Option<Arc<TrialMetrics>>,
) -> TrialVerdict {
    let cluster = KubeCluster::new(client, &config);
    info!(
        namespace = %cluster.namespace(),
        class = %params.resource_class,
        ordinal = params.resource_ordinal,
        mode = ?params.mode(),
        "Starting expansion trial"
    );

    let trial = ExpansionTrial::new(cluster, config, metrics);
    let verdict = TrialVerdict::from_result(trial.run_trial(params).await);
    match &verdict {
        TrialVerdict::Passed(report) => info!(trial_id = %report.trial_id, "Trial passed"),
        TrialVerdict::Skipped(reason) => warn!(reason = %reason, "Trial skipped"),
        TrialVerdict::Failed(e) => error!(reason = e.reason(), error = %e, "Trial failed"),
    }
    verdict
}
