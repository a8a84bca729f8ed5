//! In-memory cluster for driving full trials without Kubernetes.
//!
//! Pods move through scheduled state changes keyed on tokio's clock, so tests
//! run under `start_paused` and time advances only while the engine sleeps.
//! Every query and command is appended to an event log that tests inspect to
//! check ordering.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use rook_expansion_chaos::crd::replication_factor;
use rook_expansion_chaos::error::{Result, TrialError};
use rook_expansion_chaos::platform::{
    ClusterHealthOps, InstanceInfo, InstanceState, PlatformOps, ResourceClass, StorageAdminOps,
    assign_ordinals,
};

/// Something the engine did to or asked of the cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    /// A list call; `new_initializing` counts OSDs created by expansion that were initializing.
    Listed {
        selector: String,
        new_initializing: usize,
    },
    CapacityAdded,
    Deleted(String),
    DeleteMissed(String),
    HealthChecked,
}

#[derive(Debug, Clone)]
struct MockPod {
    name: String,
    selector: &'static str,
    state: InstanceState,
    /// Pending state changes, applied once their instant has passed.
    schedule: Vec<(Instant, InstanceState)>,
    from_expansion: bool,
}

#[derive(Debug)]
struct MockState {
    pods: Vec<MockPod>,
    events: Vec<MockEvent>,
    next_id: u32,
    flexible_scaling: bool,
    osd_size: String,
    used_percent: f64,
    device_sets_per_expansion: u32,
    expansion_error: Option<String>,
    /// Pending time for pods created by expansion.
    provision_delay: Duration,
    /// Time new OSDs spend initializing before running.
    init_duration: Duration,
    /// Time for a killed pod's replacement to run.
    restart_delay: Duration,
    /// When false, new OSDs never leave Initializing.
    converges: bool,
    healthy: bool,
    list_failures_remaining: u32,
}

/// Shared handle; clones observe the same cluster.
#[derive(Debug, Clone)]
pub struct MockCluster {
    inner: Arc<Mutex<MockState>>,
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCluster {
    /// 3 running OSDs, 3 mons, 1 mgr, 1 mds and both operators.
    pub fn new() -> Self {
        let cluster = Self {
            inner: Arc::new(Mutex::new(MockState {
                pods: Vec::new(),
                events: Vec::new(),
                next_id: 0,
                flexible_scaling: false,
                osd_size: "512Gi".to_string(),
                used_percent: 11.0,
                device_sets_per_expansion: 1,
                expansion_error: None,
                provision_delay: Duration::from_secs(5),
                init_duration: Duration::from_secs(60),
                restart_delay: Duration::from_secs(20),
                converges: true,
                healthy: true,
                list_failures_remaining: 0,
            })),
        };
        cluster.add_running(ResourceClass::Osd, &["rook-ceph-osd-0", "rook-ceph-osd-1", "rook-ceph-osd-2"]);
        cluster.add_running(ResourceClass::Mon, &["rook-ceph-mon-a", "rook-ceph-mon-b", "rook-ceph-mon-c"]);
        cluster.add_running(ResourceClass::Mgr, &["rook-ceph-mgr-a"]);
        cluster.add_running(ResourceClass::Mds, &["rook-ceph-mds-a", "rook-ceph-mds-b"]);
        cluster.add_running(ResourceClass::RookOperator, &["rook-ceph-operator-5f7c"]);
        cluster.add_running(ResourceClass::OcsOperator, &["ocs-operator-6b9d"]);
        cluster
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_running(&self, class: ResourceClass, names: &[&str]) {
        let mut state = self.state();
        for name in names {
            state.pods.push(MockPod {
                name: name.to_string(),
                selector: class.label_selector(),
                state: InstanceState::Running,
                schedule: Vec::new(),
                from_expansion: false,
            });
        }
    }

    /// Replace the OSD set with `count` running OSDs.
    pub fn with_osds(self, count: usize) -> Self {
        {
            let mut state = self.state();
            state.pods.retain(|p| p.selector != ResourceClass::Osd.label_selector());
        }
        let names: Vec<String> = (0..count).map(|i| format!("rook-ceph-osd-{:02}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        self.add_running(ResourceClass::Osd, &refs);
        self
    }

    pub fn with_flexible_scaling(self, enabled: bool) -> Self {
        self.state().flexible_scaling = enabled;
        self
    }

    pub fn never_converges(self) -> Self {
        self.state().converges = false;
        self
    }

    pub fn unhealthy(self) -> Self {
        self.state().healthy = false;
        self
    }

    pub fn with_init_duration(self, duration: Duration) -> Self {
        self.state().init_duration = duration;
        self
    }

    pub fn with_expansion_error(self, message: &str) -> Self {
        self.state().expansion_error = Some(message.to_string());
        self
    }

    pub fn with_list_failures(self, failures: u32) -> Self {
        self.state().list_failures_remaining = failures;
        self
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state().events.clone()
    }

    pub fn capacity_calls(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, MockEvent::CapacityAdded))
            .count()
    }

    pub fn deletions(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Deleted(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Delete attempts, successful or not.
    pub fn delete_attempts(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, MockEvent::Deleted(_) | MockEvent::DeleteMissed(_)))
            .count()
    }

    /// Index of the first list that saw a new OSD initializing.
    pub fn first_initializing_observed(&self) -> Option<usize> {
        self.events().iter().position(|e| {
            matches!(e, MockEvent::Listed { new_initializing, .. } if *new_initializing > 0)
        })
    }

    pub fn first_deletion(&self) -> Option<usize> {
        self.events()
            .iter()
            .position(|e| matches!(e, MockEvent::Deleted(_) | MockEvent::DeleteMissed(_)))
    }

    pub fn running(&self, class: ResourceClass) -> usize {
        let mut state = self.state();
        state.advance(Instant::now());
        state
            .pods
            .iter()
            .filter(|p| p.selector == class.label_selector() && p.state == InstanceState::Running)
            .count()
    }
}

impl MockState {
    fn advance(&mut self, now: Instant) {
        for pod in &mut self.pods {
            pod.schedule.retain(|(at, next)| {
                if *at <= now {
                    pod.state = *next;
                    false
                } else {
                    true
                }
            });
        }
    }

    fn next_suffix(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl PlatformOps for MockCluster {
    async fn list_instances(&self, selector: &str) -> Result<Vec<InstanceInfo>> {
        let mut state = self.state();
        if state.list_failures_remaining > 0 {
            state.list_failures_remaining -= 1;
            return Err(TrialError::NotFound("simulated API outage".to_string()));
        }
        state.advance(Instant::now());

        let matching: Vec<&MockPod> = state.pods.iter().filter(|p| p.selector == selector).collect();
        let new_initializing = matching
            .iter()
            .filter(|p| p.from_expansion && p.state == InstanceState::Initializing)
            .count();
        let instances = assign_ordinals(matching.iter().map(|p| (p.name.clone(), p.state)));

        state.events.push(MockEvent::Listed {
            selector: selector.to_string(),
            new_initializing,
        });
        Ok(instances)
    }

    async fn delete_instance(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        let now = Instant::now();
        state.advance(now);

        let Some(pos) = state.pods.iter().position(|p| p.name == name) else {
            state.events.push(MockEvent::DeleteMissed(name.to_string()));
            return Err(TrialError::NotFound(format!("pod {}", name)));
        };
        let old = state.pods.remove(pos);
        let suffix = state.next_suffix();
        let restart_delay = state.restart_delay;
        let converges = state.converges || !old.from_expansion;
        let mut schedule = vec![(now + restart_delay / 2, InstanceState::Initializing)];
        if converges {
            schedule.push((now + restart_delay, InstanceState::Running));
        }
        state.pods.push(MockPod {
            name: format!("{}-r{}", old.name, suffix),
            selector: old.selector,
            state: InstanceState::Pending,
            schedule,
            from_expansion: old.from_expansion,
        });
        state.events.push(MockEvent::Deleted(name.to_string()));
        Ok(())
    }
}

impl StorageAdminOps for MockCluster {
    async fn add_capacity(&self, _unit_size: &str) -> Result<u32> {
        let mut state = self.state();
        if let Some(message) = state.expansion_error.clone() {
            return Err(TrialError::ExpansionFailed(message));
        }
        let now = Instant::now();
        let sets = state.device_sets_per_expansion;
        let new_osds = sets * replication_factor(state.flexible_scaling);
        let initializing_at = now + state.provision_delay;
        let running_at = initializing_at + state.init_duration;
        let converges = state.converges;

        for _ in 0..new_osds {
            let suffix = state.next_suffix();
            let mut schedule = vec![(initializing_at, InstanceState::Initializing)];
            if converges {
                schedule.push((running_at, InstanceState::Running));
            }
            state.pods.push(MockPod {
                name: format!("rook-ceph-osd-new-{}", suffix),
                selector: ResourceClass::Osd.label_selector(),
                state: InstanceState::Pending,
                schedule,
                from_expansion: true,
            });
        }
        state.events.push(MockEvent::CapacityAdded);
        Ok(sets)
    }

    async fn used_capacity_percent(&self) -> Result<f64> {
        Ok(self.state().used_percent)
    }

    async fn is_flexible_scaling_enabled(&self) -> Result<bool> {
        Ok(self.state().flexible_scaling)
    }

    async fn osd_size_unit(&self) -> Result<String> {
        Ok(self.state().osd_size.clone())
    }
}

impl ClusterHealthOps for MockCluster {
    async fn check_health_after_expansion(&self) -> Result<()> {
        let mut state = self.state();
        state.events.push(MockEvent::HealthChecked);
        if state.healthy {
            Ok(())
        } else {
            Err(TrialError::HealthCheckFailed(
                "HEALTH_WARN (PG_DEGRADED: Degraded data redundancy)".to_string(),
            ))
        }
    }
}
