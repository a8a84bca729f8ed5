//! Collaborator interfaces for the orchestration platform and storage backend.
//!
//! The trial engine never talks to Kubernetes directly; it goes through these
//! traits so that trials can run against a live cluster (`KubeCluster`) or an
//! in-memory simulation.

pub mod kube_cluster;
pub mod types;

pub use kube_cluster::KubeCluster;
pub use types::{
    InstanceInfo, InstanceState, OSD_SELECTOR, ResourceClass, assign_ordinals, count_in_state,
};

use std::future::Future;

use crate::error::Result;

/// Pod-level queries and commands against the orchestration platform.
pub trait PlatformOps {
    /// List live instances matching a label selector, ordinals assigned by name.
    fn list_instances(&self, selector: &str) -> impl Future<Output = Result<Vec<InstanceInfo>>> + Send;

    /// Request termination of a single instance by name.
    ///
    /// Returns `InstanceNotFound`-classified errors when the instance is already gone.
    fn delete_instance(&self, name: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Administrative operations on the storage backend.
pub trait StorageAdminOps {
    /// Issue one scale-out request. Returns the number of device sets added.
    ///
    /// Not safe to retry: each call provisions another increment.
    fn add_capacity(&self, unit_size: &str) -> impl Future<Output = Result<u32>> + Send;

    /// Raw used capacity, percent of total.
    fn used_capacity_percent(&self) -> impl Future<Output = Result<f64>> + Send;

    fn is_flexible_scaling_enabled(&self) -> impl Future<Output = Result<bool>> + Send;

    /// Size of one OSD's data volume (e.g. `512Gi`).
    fn osd_size_unit(&self) -> impl Future<Output = Result<String>> + Send;
}

/// Cluster-wide health verification.
pub trait ClusterHealthOps {
    /// Wait (bounded) for the cluster to settle after an expansion.
    /// Fails with `HealthCheckFailed` if it stays degraded.
    fn check_health_after_expansion(&self) -> impl Future<Output = Result<()>> + Send;
}
