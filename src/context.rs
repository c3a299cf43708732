//! Run-scoped state: completed step outputs plus the original parameters
//!
//! One `RunContext` exists per run. The run driver is its only writer;
//! capabilities and branch predicates see it as `&RunContext`. When the run
//! ends it travels out to the caller inside the terminal outcome.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::capability::StepOutput;
use crate::error::FlowError;

/// Mutable, run-scoped store of per-step outputs and invocation parameters.
///
/// Outputs are keyed by step id and iterated in completion order. The
/// parameter map is fixed for the life of the run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Immutable initial parameters from the invocation request.
    params: StepOutput,
    /// Completed step outputs, keyed by step id.
    outputs: HashMap<Arc<str>, StepOutput>,
    /// Step ids in completion order.
    order: Vec<Arc<str>>,
}

impl RunContext {
    /// Create a context seeded with the request's parameter map.
    pub fn new(params: StepOutput) -> Self {
        Self {
            params,
            outputs: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Record a step's output, overwriting any previous entry for that id.
    ///
    /// An overwritten entry keeps its original position in the completion
    /// order (the traversal never revisits a step within one run, so this
    /// only matters to direct callers).
    pub fn record_output(&mut self, step_id: impl Into<Arc<str>>, output: StepOutput) {
        let step_id = step_id.into();
        if self.outputs.insert(Arc::clone(&step_id), output).is_none() {
            self.order.push(step_id);
        }
    }

    /// Look up a completed step's output.
    ///
    /// Fails with [`FlowError::OutputNotFound`] if no step with that id has
    /// completed yet in this run.
    pub fn output(&self, step_id: &str) -> Result<&StepOutput, FlowError> {
        self.outputs
            .get(step_id)
            .ok_or_else(|| FlowError::OutputNotFound {
                step_id: step_id.to_string(),
            })
    }

    /// Look up a completed step's output, `None` if it has not run.
    ///
    /// The defensive form for branch predicates, which may probe steps on
    /// paths that were never taken.
    pub fn get_output(&self, step_id: &str) -> Option<&StepOutput> {
        self.outputs.get(step_id)
    }

    /// Single value out of a completed step's output map.
    pub fn output_value(&self, step_id: &str, key: &str) -> Option<&Value> {
        self.outputs.get(step_id).and_then(|output| output.get(key))
    }

    /// The immutable initial parameter map.
    pub fn params(&self) -> &StepOutput {
        &self.params
    }

    /// Single initial parameter by key.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// True if a step with this id has completed in this run.
    pub fn contains(&self, step_id: &str) -> bool {
        self.outputs.contains_key(step_id)
    }

    /// Step ids in completion order.
    pub fn completed(&self) -> &[Arc<str>] {
        &self.order
    }

    /// Number of completed steps.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Serialize for persistence/debugging: `{"params": .., "outputs": ..}`.
    ///
    /// Completion order is not encoded here; callers that need it pair this
    /// with [`completed`](Self::completed).
    pub fn to_json(&self) -> Value {
        let mut outputs = serde_json::Map::new();
        for id in &self.order {
            if let Some(output) = self.outputs.get(id) {
                outputs.insert(id.to_string(), Value::Object(output.clone()));
            }
        }
        serde_json::json!({
            "params": self.params,
            "outputs": outputs,
        })
    }
}
