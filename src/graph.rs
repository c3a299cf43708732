//! Immutable flow graph rooted at an entry step
//!
//! `Graph::new` walks every step reachable from the entry and rejects
//! malformed structure up front, before any run starts. A constructed graph
//! is read-only and cheap to clone, so one graph can serve any number of
//! concurrent runs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::FlowError;
use crate::step::{validate_step_id, Step};

/// Immutable handle to the entry step of a directed graph of steps.
#[derive(Debug, Clone)]
pub struct Graph {
    entry: Arc<Step>,
    /// Ids of every reachable step, for introspection.
    ids: Arc<HashSet<Arc<str>>>,
}

impl Graph {
    /// Validate and seal a graph rooted at `entry`.
    ///
    /// Walks the reachable set breadth-first and fails fast on:
    /// - an invalid step id (empty, too long, bad characters)
    /// - two distinct steps sharing one id
    /// - a step declaring both a plain successor and branches
    /// - a fallback on a step without branches
    ///
    /// Sharing a target step between several predecessors is legal and forms
    /// a DAG; a shared step is visited once. Cycles cannot be expressed:
    /// edges are `Arc<Step>` built leaf-first, so no step can reach itself.
    pub fn new(entry: impl Into<Arc<Step>>) -> Result<Self, FlowError> {
        let entry = entry.into();

        // id -> address of the step that claimed it
        let mut claimed: HashMap<Arc<str>, usize> = HashMap::new();
        let mut visited: HashSet<usize> = HashSet::new();
        let mut queue: VecDeque<Arc<Step>> = VecDeque::new();
        queue.push_back(Arc::clone(&entry));

        while let Some(step) = queue.pop_front() {
            let addr = Arc::as_ptr(&step) as usize;
            if !visited.insert(addr) {
                continue;
            }

            validate_step_id(step.id())?;

            if step.successor().is_some() && !step.branches().is_empty() {
                return Err(FlowError::ConflictingEdges {
                    id: step.id().to_string(),
                });
            }
            if step.fallback().is_some() && step.branches().is_empty() {
                return Err(FlowError::FallbackWithoutBranches {
                    id: step.id().to_string(),
                });
            }

            if let Some(prev) = claimed.insert(step.id_handle(), addr) {
                if prev != addr {
                    return Err(FlowError::DuplicateStepId {
                        id: step.id().to_string(),
                    });
                }
            }

            for edge in step.outgoing() {
                queue.push_back(Arc::clone(edge));
            }
        }

        let ids: HashSet<Arc<str>> = claimed.into_keys().collect();
        Ok(Self {
            entry,
            ids: Arc::new(ids),
        })
    }

    /// The first step every run of this graph executes.
    pub fn entry(&self) -> &Arc<Step> {
        &self.entry
    }

    /// True if a step with this id is reachable from the entry.
    pub fn contains(&self, step_id: &str) -> bool {
        self.ids.contains(step_id)
    }

    /// Number of reachable steps.
    pub fn step_count(&self) -> usize {
        self.ids.len()
    }
}
