//! Graph nodes: steps and their branch predicates
//!
//! A `Step` binds one capability to an id and declares how the run continues
//! afterwards: a plain successor, an ordered list of branch predicates with
//! an optional fallback, or nothing (terminal step). Builder methods consume
//! and return the step for fluent wiring; structural validation happens when
//! the finished entry step is handed to [`Graph::new`](crate::graph::Graph::new).
//!
//! Edges are `Arc<Step>`, so a target step can be shared by several
//! predecessors (convergent branches form a DAG) and graphs are built
//! leaf-first.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::capability::{Capability, StepOutput};
use crate::context::RunContext;
use crate::error::FlowError;

// ============================================================================
// STEP
// ============================================================================

/// One node in the execution graph, bound to exactly one capability.
pub struct Step {
    id: Arc<str>,
    capability: Arc<dyn Capability>,
    /// Declared arguments, merged over the request params at invoke time.
    args: StepOutput,
    /// Unconditional successor. Mutually exclusive with `branches`.
    next: Option<Arc<Step>>,
    /// Branch predicates, evaluated in declaration order.
    branches: Vec<Branch>,
    /// Taken when no branch predicate matches. Requires `branches`.
    fallback: Option<Arc<Step>>,
}

impl Step {
    /// Maximum allowed id length
    pub const MAX_ID_LEN: usize = 64;

    /// Create a step with a caller-assigned id.
    ///
    /// Id rules (non-empty, at most [`MAX_ID_LEN`](Self::MAX_ID_LEN) bytes,
    /// alphanumeric plus `-` and `_`) are enforced when the graph is built.
    pub fn new(id: impl Into<Arc<str>>, capability: Arc<dyn Capability>) -> Self {
        Self {
            id: id.into(),
            capability,
            args: StepOutput::new(),
            next: None,
            branches: Vec::new(),
            fallback: None,
        }
    }

    /// Attach the unconditional successor (linear chain).
    pub fn next(mut self, successor: impl Into<Arc<Step>>) -> Self {
        self.next = Some(successor.into());
        self
    }

    /// Append a branch predicate: if `condition` is the first to evaluate
    /// true, the run continues at `target`.
    pub fn when<F>(
        self,
        label: impl Into<Arc<str>>,
        condition: F,
        target: impl Into<Arc<Step>>,
    ) -> Self
    where
        F: Fn(&RunContext) -> bool + Send + Sync + 'static,
    {
        self.branch(Branch::new(label, condition, target))
    }

    /// Append an already-built branch predicate.
    pub fn branch(mut self, branch: Branch) -> Self {
        self.branches.push(branch);
        self
    }

    /// Attach the fallback successor, taken when no branch predicate
    /// matches. Only legal on a step that declares branches.
    pub fn or_else(mut self, fallback: impl Into<Arc<Step>>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    /// Declare one named argument for this step's capability.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Declare a whole argument map, merged over any arguments set so far.
    pub fn with_args(mut self, args: StepOutput) -> Self {
        self.args.extend(args);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn capability(&self) -> &Arc<dyn Capability> {
        &self.capability
    }

    pub fn args(&self) -> &StepOutput {
        &self.args
    }

    pub fn successor(&self) -> Option<&Arc<Step>> {
        self.next.as_ref()
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn fallback(&self) -> Option<&Arc<Step>> {
        self.fallback.as_ref()
    }

    /// All outgoing edges: plain successor, branch targets, fallback.
    pub fn outgoing(&self) -> impl Iterator<Item = &Arc<Step>> + '_ {
        self.next
            .iter()
            .chain(self.branches.iter().map(Branch::target))
            .chain(self.fallback.iter())
    }

    pub(crate) fn id_handle(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("capability", &self.capability.name())
            .field("args", &self.args)
            .field("next", &self.next.as_ref().map(|s| s.id()))
            .field(
                "branches",
                &self.branches.iter().map(Branch::label).collect::<Vec<_>>(),
            )
            .field("fallback", &self.fallback.as_ref().map(|s| s.id()))
            .finish()
    }
}

/// Validate the id rules shared by every step reachable from a graph entry.
pub(crate) fn validate_step_id(id: &str) -> Result<(), FlowError> {
    if id.is_empty() {
        return Err(FlowError::EmptyStepId);
    }
    if id.len() > Step::MAX_ID_LEN {
        return Err(FlowError::StepIdTooLong {
            id: id.to_string(),
            len: id.len(),
        });
    }
    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(FlowError::StepIdInvalidCharacters { id: id.to_string() });
    }
    Ok(())
}

// ============================================================================
// BRANCH PREDICATE
// ============================================================================

/// A named pairing of a boolean condition and a target step.
///
/// Plain data plus one function: the condition reads the run context (it
/// must not assume a sibling branch has run; use the defensive lookups) and
/// the target is a referenced, possibly shared, step.
pub struct Branch {
    label: Arc<str>,
    condition: Box<dyn Fn(&RunContext) -> bool + Send + Sync>,
    target: Arc<Step>,
}

impl Branch {
    pub fn new<F>(label: impl Into<Arc<str>>, condition: F, target: impl Into<Arc<Step>>) -> Self
    where
        F: Fn(&RunContext) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            condition: Box::new(condition),
            target: target.into(),
        }
    }

    /// Branch name, used in trace output.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn target(&self) -> &Arc<Step> {
        &self.target
    }

    /// Evaluate the condition against the current run context.
    pub fn matches(&self, context: &RunContext) -> bool {
        (self.condition)(context)
    }
}

impl fmt::Debug for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch")
            .field("label", &self.label)
            .field("target", &self.target.id())
            .finish()
    }
}
