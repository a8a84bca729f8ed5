//! Kubernetes-backed implementation of the collaborator traits.
//!
//! Pods are queried and deleted through the core API; capacity is added by
//! bumping the first device set of the `StorageCluster`; health comes from the
//! Rook `CephCluster` status.

use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::config::TrialConfig;
use crate::crd::{CephCluster, StorageCluster};
use crate::error::{Result, TrialError};
use crate::platform::types::{
    InstanceInfo, InstanceState, OSD_SELECTOR, assign_ordinals, count_in_state,
};
use crate::platform::{ClusterHealthOps, PlatformOps, StorageAdminOps};

/// Live cluster handle scoped to the storage namespace.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: String,
    storage_cluster_name: Option<String>,
    health_timeout: Duration,
    poll_interval: Duration,
}

impl KubeCluster {
    pub fn new(client: Client, config: &TrialConfig) -> Self {
        Self {
            client,
            namespace: config.namespace.clone(),
            storage_cluster_name: config.storage_cluster_name.clone(),
            health_timeout: config.health_timeout,
            poll_interval: config.poll_interval,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Fetch the configured StorageCluster, or the only one in the namespace.
    async fn storage_cluster(&self) -> Result<StorageCluster> {
        let api: Api<StorageCluster> = Api::namespaced(self.client.clone(), &self.namespace);
        if let Some(name) = &self.storage_cluster_name {
            return Ok(api.get(name).await?);
        }
        api.list(&ListParams::default())
            .await?
            .items
            .into_iter()
            .next()
            .ok_or_else(|| {
                TrialError::MissingField(format!("StorageCluster in namespace {}", self.namespace))
            })
    }

    async fn ceph_cluster(&self) -> Result<CephCluster> {
        let api: Api<CephCluster> = Api::namespaced(self.client.clone(), &self.namespace);
        api.list(&ListParams::default())
            .await?
            .items
            .into_iter()
            .next()
            .ok_or_else(|| {
                TrialError::MissingField(format!("CephCluster in namespace {}", self.namespace))
            })
    }

    /// One health check: Ceph reports HEALTH_OK and every OSD pod runs.
    /// Returns a description of what is still wrong otherwise.
    async fn poll_health_once(&self) -> Result<Option<String>> {
        let ceph = self.ceph_cluster().await?;
        let osds = self.list_instances(OSD_SELECTOR).await?;
        Ok(health_problem(&ceph, &osds))
    }
}

/// What keeps the cluster from counting as healthy, if anything.
///
/// Healthy means Ceph reports `HEALTH_OK` and every OSD pod is Running.
pub fn health_problem(ceph: &CephCluster, osds: &[InstanceInfo]) -> Option<String> {
    if !ceph.is_healthy() {
        return Some(ceph.health_summary());
    }
    let running = count_in_state(osds, InstanceState::Running);
    if running != osds.len() {
        return Some(format!("{}/{} OSD pods running", running, osds.len()));
    }
    None
}

fn health_timeout_error(health_timeout: Duration, last_problem: &str) -> TrialError {
    TrialError::HealthCheckFailed(format!(
        "still degraded after {:?}: {}",
        health_timeout, last_problem
    ))
}

impl PlatformOps for KubeCluster {
    #[instrument(skip(self))]
    async fn list_instances(&self, selector: &str) -> Result<Vec<InstanceInfo>> {
        let pods = self.pods().list(&ListParams::default().labels(selector)).await?;
        Ok(assign_ordinals(
            pods.items
                .iter()
                .map(|p| (p.name_any(), InstanceState::from_pod(p))),
        ))
    }

    #[instrument(skip(self))]
    async fn delete_instance(&self, name: &str) -> Result<()> {
        match self.pods().delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!(pod = %name, "Delete request accepted");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Err(TrialError::NotFound(format!("pod {}", name))),
            Err(e) => Err(e.into()),
        }
    }
}

impl StorageAdminOps for KubeCluster {
    #[instrument(skip(self))]
    async fn add_capacity(&self, unit_size: &str) -> Result<u32> {
        let sc = self
            .storage_cluster()
            .await
            .map_err(|e| TrialError::ExpansionFailed(e.to_string()))?;
        let name = sc.name_any();
        let patch = sc.scale_out_patch(unit_size)?;

        let api: Api<StorageCluster> = Api::namespaced(self.client.clone(), &self.namespace);
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| TrialError::ExpansionFailed(e.to_string()))?;
        Ok(1)
    }

    async fn used_capacity_percent(&self) -> Result<f64> {
        let ceph = self.ceph_cluster().await?;
        ceph.capacity()
            .map(|c| c.used_percent())
            .ok_or_else(|| TrialError::MissingField("CephCluster status.ceph.capacity".to_string()))
    }

    async fn is_flexible_scaling_enabled(&self) -> Result<bool> {
        Ok(self.storage_cluster().await?.flexible_scaling_enabled())
    }

    async fn osd_size_unit(&self) -> Result<String> {
        let sc = self.storage_cluster().await?;
        sc.osd_size().map(str::to_string).ok_or_else(|| {
            TrialError::MissingField(
                "storageDeviceSets[0].dataPVCTemplate.spec.resources.requests.storage".to_string(),
            )
        })
    }
}

impl ClusterHealthOps for KubeCluster {
    #[instrument(skip(self))]
    async fn check_health_after_expansion(&self) -> Result<()> {
        let started = Instant::now();
        let mut last_problem = String::from("no health check completed");

        let settled = timeout(self.health_timeout, async {
            loop {
                match self.poll_health_once().await {
                    Ok(None) => return,
                    Ok(Some(problem)) => {
                        debug!(problem = %problem, "Cluster not healthy yet");
                        last_problem = problem;
                    }
                    Err(e) => {
                        warn!(error = %e, "Health check failed, retrying");
                        last_problem = e.to_string();
                    }
                }
                sleep(self.poll_interval).await;
            }
        })
        .await;

        match settled {
            Ok(()) => {
                info!(elapsed = ?started.elapsed(), "Cluster healthy after expansion");
                Ok(())
            }
            Err(_) => Err(health_timeout_error(self.health_timeout, &last_problem)),
        }
    }
}
