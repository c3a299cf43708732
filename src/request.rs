//! Invocation request: how a caller hands a run to the engine

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::StepOutput;

/// How the caller wants the run driven.
///
/// `Sync` gives a stream the consumer drives: each poll advances the run by
/// at most one hop, and an unconsumed stream executes nothing. `Async`
/// spawns the run onto the ambient tokio runtime immediately; the stream is
/// consumed at the caller's pace while the run progresses in the background.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeMode {
    #[default]
    Sync,
    Async,
}

/// Parameters for one run of a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Execution mode (defaults to `Sync`).
    pub mode: InvokeMode,
    /// Initial parameters, visible to every step for the life of the run.
    pub params: StepOutput,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution mode.
    pub fn with_mode(mut self, mode: InvokeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set one initial parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Merge a whole parameter map over any parameters set so far.
    pub fn with_params(mut self, params: StepOutput) -> Self {
        self.params.extend(params);
        self
    }
}
