//! Resource disruption: kill one instance of a resource class by ordinal.
//!
//! The platform reschedules a replacement on its own; the disruptor only issues
//! the delete.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::{Result, TrialError};
use crate::health::TrialMetrics;
use crate::platform::{PlatformOps, ResourceClass};

pub struct ResourceDisruptor<P> {
    platform: P,
    target: Option<ResourceClass>,
    metrics: Option<Arc<TrialMetrics>>,
}

impl<P: PlatformOps> ResourceDisruptor<P> {
    pub fn new(platform: P, metrics: Option<Arc<TrialMetrics>>) -> Self {
        Self {
            platform,
            target: None,
            metrics,
        }
    }

    /// Select the class subsequent `kill` calls act on.
    pub fn set_target(&mut self, class: ResourceClass) {
        self.target = Some(class);
    }

    pub fn target(&self) -> Option<ResourceClass> {
        self.target
    }

    /// Kill the instance of the selected class at `ordinal`.
    ///
    /// Returns the name of the deleted instance.
    pub async fn kill(&self, ordinal: usize) -> Result<String> {
        let class = self
            .target
            .ok_or_else(|| TrialError::Config("no resource class selected".to_string()))?;
        self.kill_of(class, ordinal).await
    }

    /// Kill the instance of `class` at `ordinal`, ignoring the selected target.
    #[instrument(skip(self, class), fields(class = %class))]
    pub async fn kill_of(&self, class: ResourceClass, ordinal: usize) -> Result<String> {
        let result = self.try_kill(class, ordinal).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_kill(class, result.is_ok());
        }
        result
    }

    async fn try_kill(&self, class: ResourceClass, ordinal: usize) -> Result<String> {
        let not_found = || TrialError::InstanceNotFound {
            class: class.to_string(),
            ordinal,
        };

        let instances = self.platform.list_instances(class.label_selector()).await?;
        let instance = instances
            .into_iter()
            .find(|i| i.ordinal == ordinal)
            .ok_or_else(not_found)?;

        match self.platform.delete_instance(&instance.name).await {
            Ok(()) => {
                info!(pod = %instance.name, state = %instance.state, "Deleted resource instance");
                Ok(instance.name)
            }
            // Gone between list and delete: the platform is already replacing it.
            Err(e) if e.is_not_found() => Err(not_found()),
            Err(e) => Err(e),
        }
    }
}
