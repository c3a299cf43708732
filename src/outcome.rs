//! Outcome events streamed back to the caller, and the drained-run report
//!
//! A run emits one [`Outcome::Step`] per executed step, in execution order,
//! then exactly one terminal variant: [`Outcome::Completed`] on normal
//! termination or [`Outcome::Failed`] when a capability fails (or a dead end
//! is configured to fail). The terminal variants carry the run context out
//! to the caller; after one of them the stream ends.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capability::StepOutput;
use crate::context::RunContext;
use crate::error::FlowError;

// ============================================================================
// PER-STEP RECORD
// ============================================================================

/// One emitted record of a step's completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: Arc<str>,
    pub output: StepOutput,
}

// ============================================================================
// OUTCOME EVENTS
// ============================================================================

/// One item in a run's outcome stream.
#[derive(Debug)]
pub enum Outcome {
    /// A step completed; its output is now in the run context.
    Step(StepOutcome),
    /// Terminal marker: the run completed normally.
    Completed { context: RunContext },
    /// Terminal marker: the run stopped at `step_id` and no further step
    /// will execute. The context holds everything recorded before the
    /// failure.
    Failed {
        step_id: Arc<str>,
        error: FlowError,
        context: RunContext,
    },
}

impl Outcome {
    /// Extract the step id if the event is tied to one step.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            Self::Step(outcome) => Some(&outcome.step_id),
            Self::Failed { step_id, .. } => Some(step_id),
            Self::Completed { .. } => None,
        }
    }

    /// Check if this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    pub fn as_step(&self) -> Option<&StepOutcome> {
        match self {
            Self::Step(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// The final run context, present on terminal events only.
    pub fn context(&self) -> Option<&RunContext> {
        match self {
            Self::Completed { context } | Self::Failed { context, .. } => Some(context),
            Self::Step(_) => None,
        }
    }
}

// ============================================================================
// RUN REPORT
// ============================================================================

/// Why a drained run stopped early.
#[derive(Debug)]
pub struct RunFailure {
    /// Step the run stopped at, when one is attributable.
    pub step_id: Option<Arc<str>>,
    pub error: FlowError,
}

/// Summary of a fully drained run: step outcomes in execution order plus the
/// final run context.
#[derive(Debug)]
pub struct RunReport {
    pub outcomes: Vec<StepOutcome>,
    pub context: RunContext,
    pub failure: Option<RunFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Executed step ids, in execution order.
    pub fn visited(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .map(|outcome| outcome.step_id.as_ref())
            .collect()
    }

    /// A completed step's output, straight from the final context.
    pub fn output_of(&self, step_id: &str) -> Option<&StepOutput> {
        self.context.get_output(step_id)
    }

    /// Step the run failed at, if it failed at an attributable step.
    pub fn failed_step(&self) -> Option<&str> {
        self.failure.as_ref().and_then(|f| f.step_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output(value: serde_json::Value) -> StepOutput {
        value.as_object().cloned().expect("expected JSON object")
    }

    #[test]
    fn outcome_step_id_extraction() {
        let step = Outcome::Step(StepOutcome {
            step_id: "fetch".into(),
            output: output(json!({"ok": true})),
        });
        assert_eq!(step.step_id(), Some("fetch"));

        let completed = Outcome::Completed {
            context: RunContext::default(),
        };
        assert_eq!(completed.step_id(), None);

        let failed = Outcome::Failed {
            step_id: "fetch".into(),
            error: FlowError::DeadEnd {
                step_id: "fetch".into(),
            },
            context: RunContext::default(),
        };
        assert_eq!(failed.step_id(), Some("fetch"));
    }

    #[test]
    fn outcome_terminal_classification() {
        let step = Outcome::Step(StepOutcome {
            step_id: "s".into(),
            output: StepOutput::new(),
        });
        assert!(!step.is_terminal());
        assert!(step.as_step().is_some());
        assert!(step.context().is_none());

        let completed = Outcome::Completed {
            context: RunContext::default(),
        };
        assert!(completed.is_terminal());
        assert!(completed.context().is_some());
    }

    #[test]
    fn step_outcome_serializes() {
        let outcome = StepOutcome {
            step_id: "greet".into(),
            output: output(json!({"message": "hello"})),
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["step_id"], "greet");
        assert_eq!(json["output"]["message"], "hello");
    }

    #[test]
    fn report_accessors() {
        let mut context = RunContext::default();
        context.record_output("a", output(json!({"n": 1})));
        context.record_output("b", output(json!({"n": 2})));

        let report = RunReport {
            outcomes: vec![
                StepOutcome {
                    step_id: "a".into(),
                    output: output(json!({"n": 1})),
                },
                StepOutcome {
                    step_id: "b".into(),
                    output: output(json!({"n": 2})),
                },
            ],
            context,
            failure: None,
        };

        assert!(report.is_success());
        assert_eq!(report.visited(), ["a", "b"]);
        assert_eq!(report.output_of("b").unwrap().get("n"), Some(&json!(2)));
        assert_eq!(report.failed_step(), None);
    }

    #[test]
    fn report_failure_accessors() {
        let report = RunReport {
            outcomes: vec![],
            context: RunContext::default(),
            failure: Some(RunFailure {
                step_id: Some("broken".into()),
                error: FlowError::DeadEnd {
                    step_id: "broken".into(),
                },
            }),
        };

        assert!(!report.is_success());
        assert_eq!(report.failed_step(), Some("broken"));
    }
}
