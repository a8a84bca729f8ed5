//! Repeated fault injection against a moving target.
//!
//! The loop keeps killing the same (class, ordinal) while the new OSDs are
//! provisioning, and stops as soon as the convergence signal fires or the kill
//! budget runs out. Individual kill failures never stop it.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::platform::{PlatformOps, ResourceClass};
use crate::trial::disruptor::ResourceDisruptor;
use crate::trial::signal::ConvergenceListener;

/// States of the injection loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    Running,
    /// Convergence was observed; no further kills.
    StoppedBySignal,
    /// Every iteration was spent without convergence (non-fatal).
    Exhausted,
}

/// Events that move the loop out of `Running`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    SignalObserved,
    BudgetSpent,
}

impl LoopState {
    /// Apply an event. Terminal states absorb everything.
    pub fn on(self, event: LoopEvent) -> LoopState {
        match (self, event) {
            (LoopState::Running, LoopEvent::SignalObserved) => LoopState::StoppedBySignal,
            (LoopState::Running, LoopEvent::BudgetSpent) => LoopState::Exhausted,
            (terminal, _) => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoopState::Running)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Running => write!(f, "Running"),
            LoopState::StoppedBySignal => write!(f, "StoppedBySignal"),
            LoopState::Exhausted => write!(f, "Exhausted"),
        }
    }
}

/// What the loop did before it stopped.
#[derive(Debug, Clone, Serialize)]
pub struct FaultLoopReport {
    pub final_state: LoopState,
    pub kills_attempted: u32,
    pub kills_failed: u32,
    /// Names of instances actually deleted, in order.
    pub killed: Vec<String>,
}

pub struct FaultInjectionLoop<'a, P> {
    disruptor: &'a ResourceDisruptor<P>,
    listener: ConvergenceListener,
    kill_interval: Duration,
}

impl<'a, P: PlatformOps> FaultInjectionLoop<'a, P> {
    pub fn new(
        disruptor: &'a ResourceDisruptor<P>,
        listener: ConvergenceListener,
        kill_interval: Duration,
    ) -> Self {
        Self {
            disruptor,
            listener,
            kill_interval,
        }
    }

    /// Kill `(class, ordinal)` up to `max_iterations` times or until convergence.
    pub async fn run_repeatedly(
        mut self,
        class: ResourceClass,
        ordinal: usize,
        max_iterations: u32,
    ) -> FaultLoopReport {
        let mut state = LoopState::Running;
        let mut report = FaultLoopReport {
            final_state: state,
            kills_attempted: 0,
            kills_failed: 0,
            killed: Vec::new(),
        };

        for iteration in 0..max_iterations {
            if self.listener.is_reached() {
                state = state.on(LoopEvent::SignalObserved);
                break;
            }

            info!(iteration, class = %class, ordinal, "Deleting resource");
            report.kills_attempted += 1;
            match self.disruptor.kill_of(class, ordinal).await {
                Ok(name) => report.killed.push(name),
                Err(e) => {
                    report.kills_failed += 1;
                    if e.is_transient() {
                        warn!(iteration, error = %e, "Resource not available to kill, continuing");
                    } else {
                        warn!(iteration, error = %e, "Kill attempt failed, continuing");
                    }
                }
            }

            if self.listener.is_reached() {
                state = state.on(LoopEvent::SignalObserved);
                break;
            }

            if iteration + 1 < max_iterations {
                tokio::select! {
                    _ = sleep(self.kill_interval) => {}
                    _ = self.listener.reached() => {
                        state = state.on(LoopEvent::SignalObserved);
                        break;
                    }
                }
            }
        }

        state = state.on(LoopEvent::BudgetSpent);
        match state {
            LoopState::StoppedBySignal => info!(
                kills = report.kills_attempted,
                "New OSD pods reached status running, stopping fault injection"
            ),
            _ => warn!(
                max_iterations,
                kills_failed = report.kills_failed,
                "New OSD pods didn't reach status running before the kill budget ran out"
            ),
        }
        report.final_state = state;
        report
    }
}
