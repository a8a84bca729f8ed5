//! Expansion trial engine.
//!
//! Contains the coordinator and the components it composes: resource
//! disruption, capacity expansion, convergence waiting, and the repeated
//! fault-injection loop.

pub mod convergence;
pub mod coordinator;
pub mod disruptor;
pub mod expander;
pub mod fault_loop;
pub mod signal;

pub use convergence::{ConvergenceReport, ConvergenceTarget, ConvergenceWaiter};
pub use coordinator::{ExpansionTrial, TrialReport};
pub use disruptor::ResourceDisruptor;
pub use expander::{CapacityExpander, ExpansionResult};
pub use fault_loop::{FaultInjectionLoop, FaultLoopReport, LoopEvent, LoopState};
pub use signal::{ConvergenceListener, ConvergenceSignal};
