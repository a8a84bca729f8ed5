//! Runtime configuration for expansion trials.
//!
//! Everything is read from `EXPANSION_TRIAL_*` environment variables so the
//! runner can be driven from a Kubernetes Job spec; unset variables fall back
//! to the defaults below.

use std::time::Duration;

use crate::error::{Result, TrialError};
use crate::platform::ResourceClass;

/// Namespace the storage cluster lives in.
pub const DEFAULT_NAMESPACE: &str = "openshift-storage";

/// Upper bound on OSDs the platform supports; trials are skipped at or above it.
pub const MAX_OSDS: usize = 15;

/// Default kill budget for repeated-kill mode.
pub const DEFAULT_MAX_ITERATIONS: u32 = 30;

/// Default deadline for the new OSDs to reach Running.
pub const DEFAULT_CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(420);

const ENV_PREFIX: &str = "EXPANSION_TRIAL_";

/// Cluster-facing knobs shared by every trial in a run.
#[derive(Debug, Clone)]
pub struct TrialConfig {
    pub namespace: String,
    /// StorageCluster to expand; the first one in the namespace when unset.
    pub storage_cluster_name: Option<String>,
    /// Interval between platform polls.
    pub poll_interval: Duration,
    /// Pause between kills in repeated-kill mode.
    pub kill_interval: Duration,
    /// Deadline for the first new OSD to show up initializing.
    pub initializing_timeout: Duration,
    /// Deadline for the post-trial health check.
    pub health_timeout: Duration,
    pub max_osds: usize,
    /// Serve health endpoints and metrics on this port when set.
    pub metrics_port: Option<u16>,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            storage_cluster_name: None,
            poll_interval: Duration::from_secs(5),
            kill_interval: Duration::from_secs(10),
            initializing_timeout: Duration::from_secs(240),
            health_timeout: Duration::from_secs(1200),
            max_osds: MAX_OSDS,
            metrics_port: None,
        }
    }
}

impl TrialConfig {
    /// Build from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (used by tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        let config = Self {
            namespace: get("NAMESPACE").unwrap_or(defaults.namespace),
            storage_cluster_name: get("STORAGE_CLUSTER").or(defaults.storage_cluster_name),
            poll_interval: parse_secs("POLL_INTERVAL_SECS", get("POLL_INTERVAL_SECS"))?
                .unwrap_or(defaults.poll_interval),
            kill_interval: parse_secs("KILL_INTERVAL_SECS", get("KILL_INTERVAL_SECS"))?
                .unwrap_or(defaults.kill_interval),
            initializing_timeout: parse_secs("INIT_TIMEOUT_SECS", get("INIT_TIMEOUT_SECS"))?
                .unwrap_or(defaults.initializing_timeout),
            health_timeout: parse_secs("HEALTH_TIMEOUT_SECS", get("HEALTH_TIMEOUT_SECS"))?
                .unwrap_or(defaults.health_timeout),
            max_osds: parse("MAX_OSDS", get("MAX_OSDS"))?.unwrap_or(defaults.max_osds),
            metrics_port: parse("METRICS_PORT", get("METRICS_PORT"))?.or(defaults.metrics_port),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(TrialError::Config("poll interval must be positive".to_string()));
        }
        if self.max_osds == 0 {
            return Err(TrialError::Config("max OSDs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Kill mode of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KillMode {
    /// Delete the target once, then wait for convergence.
    Single,
    /// Keep deleting the target while waiting for convergence.
    Repeated,
}

/// Per-trial parameters (the harness entry point's arguments).
#[derive(Debug, Clone)]
pub struct TrialParams {
    pub resource_class: ResourceClass,
    pub resource_ordinal: usize,
    pub repeat_kills: bool,
    pub max_iterations: u32,
    pub convergence_timeout: Duration,
}

impl TrialParams {
    /// Single-kill trial with default budget and timeout.
    pub fn new(resource_class: ResourceClass, resource_ordinal: usize) -> Self {
        Self {
            resource_class,
            resource_ordinal,
            repeat_kills: false,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            convergence_timeout: DEFAULT_CONVERGENCE_TIMEOUT,
        }
    }

    pub fn repeated(mut self, repeat_kills: bool) -> Self {
        self.repeat_kills = repeat_kills;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_convergence_timeout(mut self, timeout: Duration) -> Self {
        self.convergence_timeout = timeout;
        self
    }

    pub fn mode(&self) -> KillMode {
        if self.repeat_kills {
            KillMode::Repeated
        } else {
            KillMode::Single
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        let resource_class = get("RESOURCE_CLASS")
            .ok_or_else(|| TrialError::Config(format!("{}RESOURCE_CLASS is required", ENV_PREFIX)))?
            .parse::<ResourceClass>()
            .map_err(TrialError::Config)?;
        let resource_ordinal = parse("RESOURCE_ORDINAL", get("RESOURCE_ORDINAL"))?.unwrap_or(0);

        let mut params = Self::new(resource_class, resource_ordinal);
        if let Some(repeat) = parse::<bool>("REPEAT_KILLS", get("REPEAT_KILLS"))? {
            params.repeat_kills = repeat;
        }
        if let Some(max) = parse("MAX_ITERATIONS", get("MAX_ITERATIONS"))? {
            params.max_iterations = max;
        }
        if let Some(timeout) = parse_secs("CONVERGENCE_TIMEOUT_SECS", get("CONVERGENCE_TIMEOUT_SECS"))? {
            params.convergence_timeout = timeout;
        }
        if params.max_iterations == 0 {
            return Err(TrialError::Config("max iterations must be positive".to_string()));
        }
        Ok(params)
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: Option<String>) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.trim().parse::<T>().map_err(|e| {
                TrialError::Config(format!("invalid {}{}={:?}: {}", ENV_PREFIX, name, v, e))
            })
        })
        .transpose()
}

fn parse_secs(name: &str, value: Option<String>) -> Result<Option<Duration>> {
    Ok(parse::<u64>(name, value)?.map(Duration::from_secs))
}
