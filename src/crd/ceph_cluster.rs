//! CephCluster Custom Resource Definition (read-only view).
//!
//! Only the status fields the trial reads are modelled: overall Ceph health,
//! health check details, and raw capacity.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Health string Ceph reports once all checks pass.
pub const HEALTH_OK: &str = "HEALTH_OK";

/// Rook CephCluster. The spec is opaque to this crate.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephCluster",
    plural = "cephclusters",
    status = "CephClusterStatus",
    namespaced
)]
pub struct CephClusterSpec {
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CephClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ceph: Option<CephStatus>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CephStatus {
    /// `HEALTH_OK`, `HEALTH_WARN` or `HEALTH_ERR`.
    #[serde(default)]
    pub health: String,

    /// Active health checks keyed by check name (e.g. `OSD_DOWN`).
    #[serde(default)]
    pub details: BTreeMap<String, CephHealthDetail>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<CephCapacity>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CephHealthDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CephCapacity {
    #[serde(default)]
    pub bytes_total: u64,
    #[serde(default)]
    pub bytes_used: u64,
    #[serde(default)]
    pub bytes_available: u64,
}

impl CephCapacity {
    /// Raw used capacity as a percentage of total.
    pub fn used_percent(&self) -> f64 {
        if self.bytes_total == 0 {
            return 0.0;
        }
        self.bytes_used as f64 / self.bytes_total as f64 * 100.0
    }
}

impl CephCluster {
    /// Reported Ceph health, if the operator has populated it yet.
    pub fn health(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.ceph.as_ref())
            .map(|c| c.health.as_str())
    }

    pub fn is_healthy(&self) -> bool {
        self.health() == Some(HEALTH_OK)
    }

    /// One line per active health check, for failure messages.
    pub fn health_summary(&self) -> String {
        let Some(ceph) = self.status.as_ref().and_then(|s| s.ceph.as_ref()) else {
            return "no ceph status reported".to_string();
        };
        if ceph.details.is_empty() {
            return ceph.health.clone();
        }
        let checks: Vec<String> = ceph
            .details
            .iter()
            .map(|(name, d)| format!("{}: {}", name, d.message))
            .collect();
        format!("{} ({})", ceph.health, checks.join("; "))
    }

    pub fn capacity(&self) -> Option<&CephCapacity> {
        self.status
            .as_ref()
            .and_then(|s| s.ceph.as_ref())
            .and_then(|c| c.capacity.as_ref())
    }
}
