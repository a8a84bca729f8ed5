//! Convergence waiting: poll the platform until the expanded OSD set runs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::crd::{expected_osd_pods, replication_factor};
use crate::error::{Result, TrialError};
use crate::health::TrialMetrics;
use crate::platform::{
    InstanceInfo, InstanceState, OSD_SELECTOR, PlatformOps, StorageAdminOps, count_in_state,
};
use crate::trial::signal::ConvergenceSignal;

/// What "converged" means for one wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvergenceTarget {
    pub selector: String,
    pub desired_count: usize,
    pub desired_state: InstanceState,
    #[serde(skip)]
    pub timeout: Duration,
}

impl ConvergenceTarget {
    /// Target for the OSD set after `device_sets_added` new device sets.
    pub fn for_expansion(
        baseline: usize,
        device_sets_added: u32,
        flexible_scaling: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            selector: OSD_SELECTOR.to_string(),
            desired_count: expected_osd_pods(baseline, device_sets_added, flexible_scaling),
            desired_state: InstanceState::Running,
            timeout,
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} {} pods matching {}",
            self.desired_count, self.desired_state, self.selector
        )
    }
}

/// Result of a successful expansion wait.
#[derive(Debug, Clone, Serialize)]
pub struct ConvergenceReport {
    pub target: ConvergenceTarget,
    pub replication_factor: u32,
    pub elapsed_secs: f64,
}

pub struct ConvergenceWaiter<C> {
    cluster: C,
    poll_interval: Duration,
    metrics: Option<Arc<TrialMetrics>>,
}

impl<C> ConvergenceWaiter<C>
where
    C: PlatformOps + StorageAdminOps,
{
    pub fn new(cluster: C, poll_interval: Duration, metrics: Option<Arc<TrialMetrics>>) -> Self {
        Self {
            cluster,
            poll_interval,
            metrics,
        }
    }

    /// Wait for the OSD set grown by `device_sets_added` to be fully running.
    ///
    /// The replication factor is resolved once, before polling starts.
    #[instrument(skip(self, signal))]
    pub async fn wait_for_expansion(
        &self,
        baseline: usize,
        device_sets_added: u32,
        timeout: Duration,
        signal: &ConvergenceSignal,
    ) -> Result<ConvergenceReport> {
        let flexible = self.cluster.is_flexible_scaling_enabled().await?;
        let factor = replication_factor(flexible);
        let target = ConvergenceTarget::for_expansion(baseline, device_sets_added, flexible, timeout);
        info!(
            baseline,
            device_sets_added,
            replication_factor = factor,
            desired = target.desired_count,
            timeout = ?timeout,
            "Waiting for OSD pods to be running"
        );

        let elapsed = self.wait_until_running(&target, signal).await?;
        Ok(ConvergenceReport {
            target,
            replication_factor: factor,
            elapsed_secs: elapsed.as_secs_f64(),
        })
    }

    /// Poll until exactly `desired_count` instances are in `desired_state`.
    ///
    /// Marks `signal` reached on success. Poll errors are logged and retried
    /// until the deadline.
    pub async fn wait_until_running(
        &self,
        target: &ConvergenceTarget,
        signal: &ConvergenceSignal,
    ) -> Result<Duration> {
        let started = Instant::now();
        let poll = async {
            loop {
                match self.cluster.list_instances(&target.selector).await {
                    Ok(instances) => {
                        let matching = count_in_state(&instances, target.desired_state);
                        if matching == target.desired_count {
                            return;
                        }
                        debug!(
                            matching,
                            total = instances.len(),
                            desired = target.desired_count,
                            "Not converged yet"
                        );
                    }
                    Err(e) => warn!(error = %e, "Failed to list instances, retrying"),
                }
                sleep(self.poll_interval).await;
            }
        };

        match timeout(target.timeout, poll).await {
            Ok(()) => {
                let elapsed = started.elapsed();
                signal.mark_reached();
                if let Some(metrics) = &self.metrics {
                    metrics.record_convergence(elapsed.as_secs_f64());
                }
                info!(elapsed = ?elapsed, desired = target.desired_count, "New OSD pods reached status running");
                Ok(elapsed)
            }
            Err(_) => Err(TrialError::DeadlineExceeded {
                what: target.describe(),
                elapsed: started.elapsed(),
            }),
        }
    }

    /// Block until an OSD not present at baseline reports `Initializing`.
    ///
    /// This is the moment faults are injected: new replicas are mid-provisioning.
    /// A new OSD that went from Pending to Running between two polls means the
    /// window was missed; that is logged and returned rather than waited out.
    #[instrument(skip(self, baseline_names))]
    pub async fn wait_for_new_instances_initializing(
        &self,
        baseline_names: &HashSet<String>,
        timeout_duration: Duration,
    ) -> Result<InstanceInfo> {
        let started = Instant::now();
        let poll = async {
            loop {
                match self.cluster.list_instances(OSD_SELECTOR).await {
                    Ok(instances) => {
                        if let Some(found) = first_new_provisioning(instances, baseline_names) {
                            return found;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to list OSD pods, retrying"),
                }
                sleep(self.poll_interval).await;
            }
        };

        match timeout(timeout_duration, poll).await {
            Ok(instance) if instance.state == InstanceState::Initializing => {
                info!(pod = %instance.name, elapsed = ?started.elapsed(), "New OSD pod is initializing");
                Ok(instance)
            }
            Ok(instance) => {
                warn!(
                    pod = %instance.name,
                    state = %instance.state,
                    elapsed = ?started.elapsed(),
                    "New OSD pod was never seen initializing, injecting faults late"
                );
                Ok(instance)
            }
            Err(_) => Err(TrialError::DeadlineExceeded {
                what: "a new OSD pod to start initializing".to_string(),
                elapsed: started.elapsed(),
            }),
        }
    }
}

/// A new OSD that is Initializing, or failing that one that is already Running.
fn first_new_provisioning(
    instances: Vec<InstanceInfo>,
    baseline_names: &HashSet<String>,
) -> Option<InstanceInfo> {
    let mut running = None;
    for instance in instances {
        if baseline_names.contains(&instance.name) {
            continue;
        }
        match instance.state {
            InstanceState::Initializing => return Some(instance),
            InstanceState::Running if running.is_none() => running = Some(instance),
            _ => {}
        }
    }
    running
}
