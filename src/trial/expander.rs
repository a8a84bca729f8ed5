//! Capacity expansion: one scale-out request per call, never retried.

use serde::Serialize;
use tracing::{error, info, instrument};

use crate::error::{Result, TrialError};
use crate::platform::StorageAdminOps;

/// Outcome of a scale-out request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExpansionResult {
    /// Logical device sets created. OSD pods = this x replication factor.
    pub device_sets_added: u32,
}

pub struct CapacityExpander<S> {
    storage: S,
}

impl<S: StorageAdminOps> CapacityExpander<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Add one increment of `unit_size` capacity.
    ///
    /// A second call provisions a second increment, so callers must not retry
    /// after an ambiguous failure.
    #[instrument(skip(self))]
    pub async fn expand(&self, unit_size: &str) -> Result<ExpansionResult> {
        info!(unit_size = %unit_size, "Adding one new set of OSDs");
        let device_sets_added = match self.storage.add_capacity(unit_size).await {
            Ok(n) => n,
            Err(e @ TrialError::ExpansionFailed(_)) => return Err(e),
            Err(e) => return Err(TrialError::ExpansionFailed(e.to_string())),
        };
        if device_sets_added == 0 {
            error!("Scale-out request was accepted but created no device sets");
            return Err(TrialError::ExpansionFailed(
                "scale-out created no device sets".to_string(),
            ));
        }
        info!(device_sets_added, "Scale-out request issued");
        Ok(ExpansionResult { device_sets_added })
    }
}
