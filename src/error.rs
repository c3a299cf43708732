//! Engine error taxonomy

use thiserror::Error;

/// All error variants are part of the public API.
///
/// Graph construction errors are returned synchronously from [`Graph::new`];
/// run-time errors are delivered as terminal items in the outcome stream and
/// never raised out of the engine itself.
///
/// [`Graph::new`]: crate::graph::Graph::new
#[derive(Error, Debug)]
pub enum FlowError {
    // ─────────────────────────────────────────────────────────────
    // Graph construction errors
    // ─────────────────────────────────────────────────────────────
    #[error("step id cannot be empty")]
    EmptyStepId,

    #[error("step id '{id}' is too long ({len} > {})", crate::step::Step::MAX_ID_LEN)]
    StepIdTooLong { id: String, len: usize },

    #[error("step id '{id}' contains invalid characters (allowed: alphanumeric, '-', '_')")]
    StepIdInvalidCharacters { id: String },

    #[error("duplicate step id '{id}' in graph")]
    DuplicateStepId { id: String },

    #[error("step '{id}' declares both a plain successor and branches")]
    ConflictingEdges { id: String },

    #[error("step '{id}' declares a fallback but no branches")]
    FallbackWithoutBranches { id: String },

    // ─────────────────────────────────────────────────────────────
    // Run-time errors (terminal outcome items)
    // ─────────────────────────────────────────────────────────────
    #[error("no output recorded for step '{step_id}' in this run")]
    OutputNotFound { step_id: String },

    #[error("step '{step_id}' capability failed: {error:#}")]
    Capability { step_id: String, error: anyhow::Error },

    #[error("step '{step_id}' matched no branch and has no fallback")]
    DeadEnd { step_id: String },

    #[error("run ended without a terminal outcome")]
    Interrupted,

    // ─────────────────────────────────────────────────────────────
    // Capability directory errors
    // ─────────────────────────────────────────────────────────────
    #[error("no capability registered under name '{name}'")]
    UnknownCapability { name: String },
}

impl FlowError {
    /// True for errors detected while constructing a [`Graph`](crate::graph::Graph).
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyStepId
                | Self::StepIdTooLong { .. }
                | Self::StepIdInvalidCharacters { .. }
                | Self::DuplicateStepId { .. }
                | Self::ConflictingEdges { .. }
                | Self::FallbackWithoutBranches { .. }
        )
    }
}
