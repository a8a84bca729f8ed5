//! StorageCluster Custom Resource Definition.
//!
//! Mirrors the subset of `ocs.openshift.io/v1` StorageCluster that capacity
//! expansion touches. Device sets keep any fields this crate does not model so
//! that a merge patch of `storageDeviceSets` round-trips them untouched.

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TrialError};

/// StorageCluster is the top-level resource of an OpenShift Data Foundation install.
///
/// Example:
/// ```yaml
/// apiVersion: ocs.openshift.io/v1
/// kind: StorageCluster
/// metadata:
///   name: ocs-storagecluster
///   namespace: openshift-storage
/// spec:
///   flexibleScaling: false
///   storageDeviceSets:
///     - name: ocs-deviceset
///       count: 1
///       replica: 3
///       dataPVCTemplate:
///         spec:
///           resources:
///             requests:
///               storage: 512Gi
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ocs.openshift.io",
    version = "v1",
    kind = "StorageCluster",
    plural = "storageclusters",
    status = "StorageClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StorageClusterSpec {
    /// Device sets backing the OSDs. Scaling out bumps `count` on the first one.
    #[serde(default)]
    pub storage_device_sets: Vec<StorageDeviceSet>,

    /// When enabled, each new device set yields one OSD instead of `replica`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flexible_scaling: Option<bool>,
}

/// A logical group of OSDs provisioned from the same PVC template.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageDeviceSet {
    /// Device set name.
    #[serde(default)]
    pub name: String,

    /// Number of device-set copies. Each copy creates `replica` OSDs.
    #[serde(default)]
    pub count: i32,

    /// OSDs created per copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica: Option<i32>,

    /// PVC template used for each OSD's data volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "dataPVCTemplate")]
    pub data_pvc_template: Option<serde_json::Value>,

    /// Fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl StorageDeviceSet {
    /// Storage request of the data PVC template (e.g. `512Gi`).
    pub fn storage_request(&self) -> Option<&str> {
        self.data_pvc_template
            .as_ref()
            .and_then(|t| t.pointer("/spec/resources/requests/storage"))
            .and_then(|v| v.as_str())
    }
}

/// Observed state of a StorageCluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageClusterStatus {
    /// Lifecycle phase reported by the ocs-operator (e.g. `Ready`, `Progressing`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl StorageCluster {
    /// Whether flexible scaling is turned on for this cluster.
    pub fn flexible_scaling_enabled(&self) -> bool {
        self.spec.flexible_scaling.unwrap_or(false)
    }

    /// OSD size unit, taken from the first device set.
    pub fn osd_size(&self) -> Option<&str> {
        self.spec
            .storage_device_sets
            .first()
            .and_then(StorageDeviceSet::storage_request)
    }

    /// Merge patch adding one copy of the first device set.
    ///
    /// The whole `storageDeviceSets` list is sent back, since a merge patch
    /// replaces lists wholesale. A `unit_size` that differs from the set's PVC
    /// size is logged and otherwise ignored.
    pub fn scale_out_patch(&self, unit_size: &str) -> Result<serde_json::Value> {
        let name = self.name_any();
        let mut device_sets = self.spec.storage_device_sets.clone();
        let Some(first) = device_sets.first_mut() else {
            return Err(TrialError::ExpansionFailed(format!(
                "StorageCluster {} has no storageDeviceSets",
                name
            )));
        };
        if let Some(current) = first.storage_request()
            && current != unit_size
        {
            warn!(
                device_set = %first.name,
                current = %current,
                requested = %unit_size,
                "Requested unit size differs from the device set's PVC size"
            );
        }
        first.count += 1;
        info!(
            storage_cluster = %name,
            device_set = %first.name,
            count = first.count,
            "Scaling out storage device set"
        );

        Ok(serde_json::json!({
            "spec": {
                "storageDeviceSets": device_sets
            }
        }))
    }
}

/// OSD replication factor for newly added device sets.
pub fn replication_factor(flexible_scaling: bool) -> u32 {
    if flexible_scaling { 1 } else { 3 }
}

/// Number of OSD pods expected once `device_sets_added` new sets are running.
pub fn expected_osd_pods(baseline: usize, device_sets_added: u32, flexible_scaling: bool) -> usize {
    baseline + (device_sets_added * replication_factor(flexible_scaling)) as usize
}
