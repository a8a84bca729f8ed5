//! Types describing killable resources and their observed state.

use std::fmt;

use k8s_openapi::api::core::v1::Pod;
use serde::Serialize;

/// Label selector for Ceph OSD pods.
pub const OSD_SELECTOR: &str = "app=rook-ceph-osd";

/// Kinds of cluster resources a trial can disrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceClass {
    /// Ceph object storage daemon (data plane).
    Osd,
    /// Ceph monitor (quorum).
    Mon,
    /// Ceph manager.
    Mgr,
    /// CephFS metadata server.
    Mds,
    /// Rook operator (control plane).
    RookOperator,
    /// OCS operator (control plane).
    OcsOperator,
}

impl ResourceClass {
    /// Every class, in display order.
    pub const ALL: [ResourceClass; 6] = [
        ResourceClass::Osd,
        ResourceClass::Mon,
        ResourceClass::Mgr,
        ResourceClass::Mds,
        ResourceClass::RookOperator,
        ResourceClass::OcsOperator,
    ];

    /// Label selector matching pods of this class.
    pub fn label_selector(&self) -> &'static str {
        match self {
            ResourceClass::Osd => OSD_SELECTOR,
            ResourceClass::Mon => "app=rook-ceph-mon",
            ResourceClass::Mgr => "app=rook-ceph-mgr",
            ResourceClass::Mds => "app=rook-ceph-mds",
            ResourceClass::RookOperator => "app=rook-ceph-operator",
            ResourceClass::OcsOperator => "name=ocs-operator",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceClass::Osd => write!(f, "osd"),
            ResourceClass::Mon => write!(f, "mon"),
            ResourceClass::Mgr => write!(f, "mgr"),
            ResourceClass::Mds => write!(f, "mds"),
            ResourceClass::RookOperator => write!(f, "rook-operator"),
            ResourceClass::OcsOperator => write!(f, "ocs-operator"),
        }
    }
}

impl std::str::FromStr for ResourceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "osd" => Ok(ResourceClass::Osd),
            "mon" => Ok(ResourceClass::Mon),
            "mgr" => Ok(ResourceClass::Mgr),
            "mds" => Ok(ResourceClass::Mds),
            "rook-operator" => Ok(ResourceClass::RookOperator),
            "ocs-operator" => Ok(ResourceClass::OcsOperator),
            _ => Err(format!("Unknown resource class: {}", s)),
        }
    }
}

/// Observed lifecycle state of a single instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum InstanceState {
    /// Accepted but not yet started (unscheduled, pulling images).
    Pending,
    /// Init containers still running; the provisioning window faults target.
    Initializing,
    Running,
    Succeeded,
    Failed,
    /// Deletion requested, still shutting down.
    Terminating,
    #[default]
    Unknown,
}

impl InstanceState {
    /// Derive the state the way `kubectl get pods` would summarise it.
    pub fn from_pod(pod: &Pod) -> Self {
        if pod.metadata.deletion_timestamp.is_some() {
            return InstanceState::Terminating;
        }
        let Some(status) = pod.status.as_ref() else {
            return InstanceState::Unknown;
        };
        match status.phase.as_deref() {
            Some("Pending") => {
                // All init containers exited means PodInitializing, not Init:N/M
                let init_running = status
                    .init_container_statuses
                    .iter()
                    .flatten()
                    .any(|s| s.state.as_ref().is_none_or(|st| st.terminated.is_none()));
                if init_running {
                    InstanceState::Initializing
                } else {
                    InstanceState::Pending
                }
            }
            Some("Running") => InstanceState::Running,
            Some("Succeeded") => InstanceState::Succeeded,
            Some("Failed") => InstanceState::Failed,
            _ => InstanceState::Unknown,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A live instance as seen by the platform query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceInfo {
    pub name: String,
    /// Index within the name-sorted list of live instances of the same selector.
    pub ordinal: usize,
    pub state: InstanceState,
}

/// Drop terminating instances, sort by name and number the rest.
pub fn assign_ordinals(instances: impl IntoIterator<Item = (String, InstanceState)>) -> Vec<InstanceInfo> {
    let mut live: Vec<(String, InstanceState)> = instances
        .into_iter()
        .filter(|(_, state)| *state != InstanceState::Terminating)
        .collect();
    live.sort_by(|a, b| a.0.cmp(&b.0));
    live.into_iter()
        .enumerate()
        .map(|(ordinal, (name, state))| InstanceInfo {
            name,
            ordinal,
            state,
        })
        .collect()
}

/// Count instances in `state`.
pub fn count_in_state(instances: &[InstanceInfo], state: InstanceState) -> usize {
    instances.iter().filter(|i| i.state == state).count()
}
