//! # Flow Runner
//!
//! Drives one run of a [`Graph`]: executes steps one dependency-hop at a
//! time, records each output in the run context, emits outcome events, and
//! resolves the next step through a plain edge or the step's branch
//! predicates.
//!
//! ## Execution model
//!
//! A run is a sequential chain of suspensions; at most one capability is in
//! flight per run. The only suspension point is awaiting a capability
//! result. Runs sharing a graph never share mutable state, so any number of
//! them may progress concurrently.
//!
//! [`Runner::run`] returns an [`OutcomeStream`] whose drive mode follows the
//! request:
//!
//! - [`InvokeMode::Sync`] - the consumer drives the run; each poll advances
//!   at most one hop, and a stream that is never polled executes nothing.
//! - [`InvokeMode::Async`] - the run is spawned onto the ambient tokio
//!   runtime immediately and buffers outcomes for the consumer.
//!
//! Dropping the stream abandons the run after the in-flight capability call
//! finishes; no later step starts.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use kanva::{FnCapability, Graph, Request, Runner, Step, StepOutput};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let greet = Arc::new(FnCapability::new("greet", |_args, _ctx| {
//!     let mut out = StepOutput::new();
//!     out.insert("message".into(), "hello".into());
//!     Ok(out)
//! }));
//!
//! let graph = Graph::new(Step::new("greet", greet)).unwrap();
//! let report = Runner::new().run_to_completion(&graph, Request::new()).await;
//!
//! assert!(report.is_success());
//! assert_eq!(report.visited(), ["greet"]);
//! # }
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};

use crate::capability::StepOutput;
use crate::context::RunContext;
use crate::error::FlowError;
use crate::graph::Graph;
use crate::outcome::{Outcome, RunFailure, RunReport, StepOutcome};
use crate::request::{InvokeMode, Request};
use crate::step::Step;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Outcome buffer for a background (async-mode) run; once it is full the
/// driver waits for the consumer before executing further hops.
const OUTCOME_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// DEAD-END POLICY
// ============================================================================

/// What a run does when every branch predicate of a step evaluates false
/// and the step declares no fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeadEndPolicy {
    /// Treat the step as terminal; the run completes normally.
    #[default]
    Complete,
    /// End the run with a terminal [`FlowError::DeadEnd`] outcome.
    Fail,
}

// ============================================================================
// RUNNER
// ============================================================================

/// Flow-graph engine: consumes a [`Graph`] and a [`Request`], produces an
/// ordered stream of [`Outcome`] events.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    dead_end: DeadEndPolicy,
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the dead-end behavior (defaults to
    /// [`DeadEndPolicy::Complete`]).
    pub fn dead_end_policy(mut self, policy: DeadEndPolicy) -> Self {
        self.dead_end = policy;
        self
    }

    /// Start one run of `graph` and return its outcome stream.
    ///
    /// The stream yields one [`Outcome::Step`] per executed step, in
    /// execution order, then exactly one terminal event. Capability
    /// failures arrive as the terminal [`Outcome::Failed`] item; nothing is
    /// raised out of the engine once the run has started.
    ///
    /// # Panics
    ///
    /// Panics if `request.mode` is [`InvokeMode::Async`] and no tokio
    /// runtime is ambient.
    #[instrument(skip(self, graph, request), fields(entry = %graph.entry().id(), mode = ?request.mode))]
    pub fn run(&self, graph: &Graph, request: Request) -> OutcomeStream {
        let entry = Arc::clone(graph.entry());
        let context = RunContext::new(request.params);

        match request.mode {
            InvokeMode::Sync => OutcomeStream::lazy(entry, context, self.dead_end),
            InvokeMode::Async => OutcomeStream::spawned(entry, context, self.dead_end),
        }
    }

    /// Run `graph` and drain the outcome stream to its end.
    ///
    /// This is the blocking consumption pattern: control returns only once
    /// the run has reached a terminal state. The report carries every step
    /// outcome plus the final run context.
    pub async fn run_to_completion(&self, graph: &Graph, request: Request) -> RunReport {
        self.run(graph, request).drain().await
    }
}

// ============================================================================
// OUTCOME STREAM
// ============================================================================

/// Ordered stream of [`Outcome`] events for one run.
///
/// Ends after the terminal event. Dropping it cancels the run between hops.
pub struct OutcomeStream {
    inner: BoxStream<'static, Outcome>,
}

impl OutcomeStream {
    /// Consumer-driven stream: each poll advances the run by at most one
    /// hop.
    fn lazy(entry: Arc<Step>, context: RunContext, policy: DeadEndPolicy) -> Self {
        let stream = stream::unfold(DriveState::Hop(entry, context), move |state| async move {
            match state {
                DriveState::Hop(step, context) => match advance(step, context, policy).await {
                    HopState::Advance {
                        event,
                        next,
                        context,
                    } => Some((Outcome::Step(event), DriveState::Hop(next, context))),
                    HopState::Finish { event, terminal } => {
                        Some((Outcome::Step(event), DriveState::Emit(terminal)))
                    }
                    HopState::Abort { terminal } => Some((terminal, DriveState::Done)),
                },
                DriveState::Emit(terminal) => Some((terminal, DriveState::Done)),
                DriveState::Done => None,
            }
        });

        Self {
            inner: stream.boxed(),
        }
    }

    /// Background-driven stream: the run is spawned immediately and feeds a
    /// bounded channel.
    fn spawned(entry: Arc<Step>, context: RunContext, policy: DeadEndPolicy) -> Self {
        let (tx, rx) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);
        tokio::spawn(drive(entry, context, policy, tx));

        Self {
            inner: ReceiverStream::new(rx).boxed(),
        }
    }

    /// Consume the stream to its end and summarize the run.
    ///
    /// If the stream ends without a terminal event (the background driver
    /// was aborted mid-run), the report rebuilds a context from the
    /// observed outcomes and carries [`FlowError::Interrupted`].
    pub async fn drain(mut self) -> RunReport {
        let mut outcomes: Vec<StepOutcome> = Vec::new();

        while let Some(outcome) = self.next().await {
            match outcome {
                Outcome::Step(event) => outcomes.push(event),
                Outcome::Completed { context } => {
                    return RunReport {
                        outcomes,
                        context,
                        failure: None,
                    }
                }
                Outcome::Failed {
                    step_id,
                    error,
                    context,
                } => {
                    return RunReport {
                        outcomes,
                        context,
                        failure: Some(RunFailure {
                            step_id: Some(step_id),
                            error,
                        }),
                    }
                }
            }
        }

        let mut context = RunContext::default();
        for event in &outcomes {
            context.record_output(Arc::clone(&event.step_id), event.output.clone());
        }
        RunReport {
            outcomes,
            context,
            failure: Some(RunFailure {
                step_id: None,
                error: FlowError::Interrupted,
            }),
        }
    }
}

impl Stream for OutcomeStream {
    type Item = Outcome;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for OutcomeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeStream").finish_non_exhaustive()
    }
}

// ============================================================================
// TRAVERSAL
// ============================================================================

/// Driver position between polls of a lazy stream.
enum DriveState {
    /// About to execute this step with this context.
    Hop(Arc<Step>, RunContext),
    /// Step event already emitted; terminal event still pending.
    Emit(Outcome),
    Done,
}

/// Result of executing one step and resolving what follows it.
enum HopState {
    Advance {
        event: StepOutcome,
        next: Arc<Step>,
        context: RunContext,
    },
    Finish {
        event: StepOutcome,
        terminal: Outcome,
    },
    Abort {
        terminal: Outcome,
    },
}

enum Resolution {
    Goto(Arc<Step>),
    Terminal,
    NoMatch,
}

/// Execute one step: invoke its capability, record the output, resolve the
/// successor.
#[instrument(skip_all, fields(step_id = %step.id()))]
async fn advance(step: Arc<Step>, mut context: RunContext, policy: DeadEndPolicy) -> HopState {
    let args = merged_args(&step, &context);
    debug!(capability = %step.capability().name(), "invoking capability");

    let output = match step.capability().invoke(args, &context).await {
        Ok(output) => output,
        Err(error) => {
            warn!(error = %error, "capability failed; run aborted");
            let step_id = step.id_handle();
            let error = FlowError::Capability {
                step_id: step_id.to_string(),
                error,
            };
            return HopState::Abort {
                terminal: Outcome::Failed {
                    step_id,
                    error,
                    context,
                },
            };
        }
    };

    let step_id = step.id_handle();
    context.record_output(Arc::clone(&step_id), output.clone());
    let event = StepOutcome {
        step_id: Arc::clone(&step_id),
        output,
    };

    match resolve_successor(&step, &context) {
        Resolution::Goto(next) => {
            debug!(next = %next.id(), "advancing");
            HopState::Advance {
                event,
                next,
                context,
            }
        }
        Resolution::Terminal => {
            info!(steps = context.len(), "run completed");
            HopState::Finish {
                event,
                terminal: Outcome::Completed { context },
            }
        }
        Resolution::NoMatch => match policy {
            DeadEndPolicy::Complete => {
                debug!("no branch matched; treating step as terminal");
                info!(steps = context.len(), "run completed");
                HopState::Finish {
                    event,
                    terminal: Outcome::Completed { context },
                }
            }
            DeadEndPolicy::Fail => {
                warn!("no branch matched and no fallback; run failed");
                let error = FlowError::DeadEnd {
                    step_id: step_id.to_string(),
                };
                HopState::Finish {
                    event,
                    terminal: Outcome::Failed {
                        step_id,
                        error,
                        context,
                    },
                }
            }
        },
    }
}

/// Pick the step that follows `step`, if any.
///
/// Plain successor first; otherwise branch predicates in declaration order,
/// short-circuiting at the first match; otherwise the fallback. A step with
/// no edges at all is terminal.
fn resolve_successor(step: &Step, context: &RunContext) -> Resolution {
    if let Some(next) = step.successor() {
        return Resolution::Goto(Arc::clone(next));
    }
    if step.branches().is_empty() {
        return Resolution::Terminal;
    }
    for branch in step.branches() {
        if branch.matches(context) {
            debug!(branch = %branch.label(), target = %branch.target().id(), "branch matched");
            return Resolution::Goto(Arc::clone(branch.target()));
        }
    }
    if let Some(fallback) = step.fallback() {
        debug!(fallback = %fallback.id(), "no branch matched; fallback taken");
        return Resolution::Goto(Arc::clone(fallback));
    }
    Resolution::NoMatch
}

/// Request params overlaid with the step's declared arguments; the step
/// wins on key collision.
fn merged_args(step: &Step, context: &RunContext) -> StepOutput {
    let mut args = context.params().clone();
    for (key, value) in step.args() {
        args.insert(key.clone(), value.clone());
    }
    args
}

/// Background driver for async-mode runs. Stops between hops as soon as the
/// consumer drops the stream.
async fn drive(
    mut step: Arc<Step>,
    mut context: RunContext,
    policy: DeadEndPolicy,
    tx: mpsc::Sender<Outcome>,
) {
    loop {
        match advance(step, context, policy).await {
            HopState::Advance {
                event,
                next,
                context: advanced,
            } => {
                if tx.send(Outcome::Step(event)).await.is_err() {
                    debug!("outcome stream dropped; abandoning run");
                    return;
                }
                step = next;
                context = advanced;
            }
            HopState::Finish { event, terminal } => {
                if tx.send(Outcome::Step(event)).await.is_err() {
                    debug!("outcome stream dropped; abandoning run");
                    return;
                }
                let _ = tx.send(terminal).await;
                return;
            }
            HopState::Abort { terminal } => {
                let _ = tx.send(terminal).await;
                return;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, FnCapability};
    use serde_json::json;

    fn emit(name: &str, value: serde_json::Value) -> Arc<dyn Capability> {
        let payload = value.as_object().cloned().expect("expected JSON object");
        Arc::new(FnCapability::new(name.to_string(), move |_args, _ctx| {
            Ok(payload.clone())
        }))
    }

    fn echo_args(name: &str) -> Arc<dyn Capability> {
        Arc::new(FnCapability::new(name.to_string(), |args, _ctx| Ok(args)))
    }

    #[test]
    fn default_policy_is_complete() {
        assert_eq!(Runner::new().dead_end, DeadEndPolicy::Complete);

        let strict = Runner::new().dead_end_policy(DeadEndPolicy::Fail);
        assert_eq!(strict.dead_end, DeadEndPolicy::Fail);
    }

    #[tokio::test]
    async fn single_step_run_completes() {
        let graph = Graph::new(Step::new("only", emit("tool", json!({"done": true})))).unwrap();
        let report = Runner::new().run_to_completion(&graph, Request::new()).await;

        assert!(report.is_success());
        assert_eq!(report.visited(), ["only"]);
        assert_eq!(
            report.output_of("only").unwrap().get("done"),
            Some(&json!(true))
        );
    }

    #[tokio::test]
    async fn step_args_override_request_params() {
        let graph = Graph::new(
            Step::new("echo", echo_args("echo"))
                .arg("who", "step")
                .arg("extra", 1),
        )
        .unwrap();

        let request = Request::new().param("who", "request").param("base", 0);
        let report = Runner::new().run_to_completion(&graph, request).await;

        let output = report.output_of("echo").unwrap();
        assert_eq!(output.get("who"), Some(&json!("step")));
        assert_eq!(output.get("extra"), Some(&json!(1)));
        assert_eq!(output.get("base"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn terminal_event_carries_context() {
        let graph = Graph::new(Step::new("only", emit("tool", json!({"n": 1})))).unwrap();
        let mut stream = Runner::new().run(&graph, Request::new());

        let first = stream.next().await.unwrap();
        assert_eq!(first.step_id(), Some("only"));
        assert!(!first.is_terminal());

        let terminal = stream.next().await.unwrap();
        assert!(terminal.is_terminal());
        assert!(terminal.context().unwrap().contains("only"));

        assert!(stream.next().await.is_none());
    }
}
