//! Kanva - flow-graph execution engine for agent tool pipelines

pub mod capability;
pub mod context;
pub mod error;
pub mod graph;
pub mod outcome;
pub mod request;
pub mod runner;
pub mod step;

pub use capability::{Capability, CapabilityDirectory, FnCapability, StepOutput};
pub use context::RunContext;
pub use error::FlowError;
pub use graph::Graph;
pub use outcome::{Outcome, RunFailure, RunReport, StepOutcome};
pub use request::{InvokeMode, Request};
pub use runner::{DeadEndPolicy, OutcomeStream, Runner};
pub use step::{Branch, Step};
