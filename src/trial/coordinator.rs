//! Expansion trial coordinator.
//!
//! Drives one trial end to end:
//! 1. Check the OSD ceiling and record the baseline OSD set
//! 2. Select the resource class to disrupt and reset the convergence signal
//! 3. Issue the scale-out
//! 4. Wait for a new OSD to start initializing
//! 5. Kill once then wait, or kill repeatedly while waiting
//! 6. Re-assert the convergence flag, then verify cluster health

use std::collections::HashSet;
use std::sync::Arc;

use jiff::Timestamp;
use serde::Serialize;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::config::{KillMode, TrialConfig, TrialParams};
use crate::error::{Result, TrialError};
use crate::health::TrialMetrics;
use crate::platform::{
    ClusterHealthOps, OSD_SELECTOR, PlatformOps, ResourceClass, StorageAdminOps,
};
use crate::trial::convergence::{ConvergenceReport, ConvergenceWaiter};
use crate::trial::disruptor::ResourceDisruptor;
use crate::trial::expander::CapacityExpander;
use crate::trial::fault_loop::{FaultInjectionLoop, FaultLoopReport};
use crate::trial::signal::ConvergenceSignal;

/// Summary of a trial that passed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialReport {
    pub trial_id: Uuid,
    pub resource_class: ResourceClass,
    pub resource_ordinal: usize,
    pub mode: KillMode,
    pub baseline_osd_count: usize,
    pub used_capacity_percent: Option<f64>,
    pub device_sets_added: u32,
    pub convergence: ConvergenceReport,
    /// Instance deleted in single-kill mode.
    pub killed: Option<String>,
    /// Present in repeated-kill mode.
    pub fault_loop: Option<FaultLoopReport>,
    /// The convergence flag was still unset when the branch finished and had to be forced.
    pub convergence_flag_forced: bool,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

/// What step 6 produced, before the flag is re-asserted.
struct BranchOutcome {
    convergence: ConvergenceReport,
    killed: Option<String>,
    fault_loop: Option<FaultLoopReport>,
}

/// Runs expansion trials against a cluster.
pub struct ExpansionTrial<C> {
    cluster: C,
    config: TrialConfig,
    signal: ConvergenceSignal,
    metrics: Option<Arc<TrialMetrics>>,
}

impl<C> ExpansionTrial<C>
where
    C: PlatformOps + StorageAdminOps + ClusterHealthOps + Clone + Send + Sync,
{
    pub fn new(cluster: C, config: TrialConfig, metrics: Option<Arc<TrialMetrics>>) -> Self {
        Self {
            cluster,
            config,
            signal: ConvergenceSignal::new(),
            metrics,
        }
    }

    /// The trial's convergence flag, for callers that inspect it afterwards.
    pub fn signal(&self) -> &ConvergenceSignal {
        &self.signal
    }

    /// Run one trial. `PreconditionNotMet` means the trial was skipped.
    pub async fn run_trial(&self, params: &TrialParams) -> Result<TrialReport> {
        let trial_id = Uuid::new_v4();
        let span = info_span!(
            "trial",
            id = %trial_id,
            class = %params.resource_class,
            ordinal = params.resource_ordinal,
            mode = ?params.mode(),
        );
        let result = self.run(trial_id, params).instrument(span).await;

        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(_) => "passed",
                Err(e) if e.is_skip() => "skipped",
                Err(e) => e.reason(),
            };
            metrics.record_outcome(params.resource_class, outcome);
        }
        result
    }

    async fn run(&self, trial_id: Uuid, params: &TrialParams) -> Result<TrialReport> {
        let started_at = Timestamp::now();

        // Baseline and OSD ceiling
        let baseline = self.cluster.list_instances(OSD_SELECTOR).await?;
        let baseline_count = baseline.len();
        if baseline_count >= self.config.max_osds {
            warn!(
                osds = baseline_count,
                max = self.config.max_osds,
                "We have maximum of OSDs in the cluster, skipping"
            );
            return Err(TrialError::PreconditionNotMet(format!(
                "cluster already has {} OSDs (max {})",
                baseline_count, self.config.max_osds
            )));
        }
        let baseline_names: HashSet<String> = baseline.into_iter().map(|i| i.name).collect();

        let used_capacity_percent = match self.cluster.used_capacity_percent().await {
            Ok(percent) => {
                info!(used_percent = percent, "Storage utilization before expansion");
                Some(percent)
            }
            Err(e) => {
                warn!(error = %e, "Could not read used capacity");
                None
            }
        };

        let mut disruptor = ResourceDisruptor::new(self.cluster.clone(), self.metrics.clone());
        disruptor.set_target(params.resource_class);

        self.signal.reset();

        // Scale out
        let expander = CapacityExpander::new(self.cluster.clone());
        let osd_size = self.cluster.osd_size_unit().await?;
        info!(osd_size = %osd_size, baseline = baseline_count, "Resolved OSD size unit");
        let expansion = expander.expand(&osd_size).await?;

        // Injection trigger: a new OSD is mid-provisioning
        let waiter = ConvergenceWaiter::new(
            self.cluster.clone(),
            self.config.poll_interval,
            self.metrics.clone(),
        );
        waiter
            .wait_for_new_instances_initializing(&baseline_names, self.config.initializing_timeout)
            .await?;

        info!(
            "Delete a {} pod while storage capacity is getting increased",
            params.resource_class
        );
        let branch = self
            .disrupt_and_wait(&disruptor, &waiter, params, baseline_count, expansion.device_sets_added)
            .await;

        // Re-assert the flag whatever happened; the branch result stays authoritative.
        let flag_forced = self.signal.force_reached();
        if flag_forced && let Err(e) = &branch {
            warn!(
                error = %e,
                "Convergence flag forced true although the waiter did not report convergence"
            );
        }
        let branch = branch?;

        if let Some(metrics) = &self.metrics {
            metrics.set_osd_pods(
                baseline_count as i64,
                branch.convergence.target.desired_count as i64,
            );
        }

        info!("Finished verifying add capacity when one of the pods gets deleted");
        info!("Waiting for ceph health check to finish");
        self.cluster.check_health_after_expansion().await?;

        Ok(TrialReport {
            trial_id,
            resource_class: params.resource_class,
            resource_ordinal: params.resource_ordinal,
            mode: params.mode(),
            baseline_osd_count: baseline_count,
            used_capacity_percent,
            device_sets_added: expansion.device_sets_added,
            convergence: branch.convergence,
            killed: branch.killed,
            fault_loop: branch.fault_loop,
            convergence_flag_forced: flag_forced,
            started_at,
            finished_at: Timestamp::now(),
        })
    }

    async fn disrupt_and_wait(
        &self,
        disruptor: &ResourceDisruptor<C>,
        waiter: &ConvergenceWaiter<C>,
        params: &TrialParams,
        baseline: usize,
        device_sets_added: u32,
    ) -> Result<BranchOutcome> {
        match params.mode() {
            KillMode::Single => {
                let killed = disruptor.kill(params.resource_ordinal).await?;
                let convergence = waiter
                    .wait_for_expansion(
                        baseline,
                        device_sets_added,
                        params.convergence_timeout,
                        &self.signal,
                    )
                    .await?;
                Ok(BranchOutcome {
                    convergence,
                    killed: Some(killed),
                    fault_loop: None,
                })
            }
            KillMode::Repeated => {
                let fault_loop = FaultInjectionLoop::new(
                    disruptor,
                    self.signal.subscribe(),
                    self.config.kill_interval,
                );
                let (loop_report, convergence) = futures::future::join(
                    fault_loop.run_repeatedly(
                        params.resource_class,
                        params.resource_ordinal,
                        params.max_iterations,
                    ),
                    waiter.wait_for_expansion(
                        baseline,
                        device_sets_added,
                        params.convergence_timeout,
                        &self.signal,
                    ),
                )
                .await;
                info!(
                    final_state = %loop_report.final_state,
                    kills = loop_report.kills_attempted,
                    "Fault injection loop finished"
                );
                Ok(BranchOutcome {
                    convergence: convergence?,
                    killed: None,
                    fault_loop: Some(loop_report),
                })
            }
        }
    }
}
