//! # Capability Abstraction Layer
//!
//! The narrow contract the engine consumes from tool implementations.
//!
//! ## Overview
//!
//! Every step in a flow graph is bound to exactly one capability:
//!
//! - [`Capability`] - Core trait for executing one unit of work
//! - [`FnCapability`] - Adapter wrapping a plain closure
//! - [`CapabilityDirectory`] - Name-based registry consumed by graph builders
//!
//! ## Capability Trait
//!
//! All capabilities implement the `Capability` trait:
//!
//! ```rust,ignore
//! pub trait Capability: Send + Sync {
//!     fn name(&self) -> &str;
//!     async fn invoke(&self, args: StepOutput, context: &RunContext) -> Result<StepOutput>;
//! }
//! ```
//!
//! The engine calls `invoke` with the run's initial parameters merged with the
//! step's own declared arguments, plus a read-only handle to the run context.
//! A capability produces exactly one result map, or fails; no output schema is
//! enforced. Failures are opaque `anyhow::Error` values and end the run.
//!
//! ## Registering Capabilities
//!
//! A [`CapabilityDirectory`] lets graph builders wire steps by capability
//! name instead of holding each `Arc<dyn Capability>` directly:
//!
//! ```rust
//! use kanva::capability::CapabilityDirectory;
//!
//! let directory = CapabilityDirectory::new();
//! directory.register_fn("echo", |args, _ctx| Ok(args));
//!
//! let echo = directory.get("echo");
//! assert!(echo.is_ok());
//!
//! let missing = directory.get("missing");
//! assert!(missing.is_err());
//! ```
//!
//! The engine itself never touches the directory; steps carry their
//! capability by reference.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::context::RunContext;
use crate::error::FlowError;

/// Output of one capability invocation: named values, no enforced schema.
///
/// Also the shape of request parameters and per-step declared arguments.
pub type StepOutput = serde_json::Map<String, Value>;

// ============================================================================
// CAPABILITY TRAIT (ASYNC)
// ============================================================================

/// Core trait that every unit of work behind a step must implement
///
/// The Capability trait hides what a step actually does (HTTP call, storage
/// lookup, model invocation, ...) behind a single async entry point, so the
/// runner can drive any graph without knowing what its steps are made of.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Capability name, used as the directory key and in trace output.
    fn name(&self) -> &str;

    /// Execute one unit of work.
    ///
    /// `args` is the run's initial parameter map merged with the step's own
    /// declared arguments (step arguments win on key collision). `context`
    /// exposes the outputs of every step completed earlier in this run;
    /// capabilities may read it but routing decisions belong in branch
    /// predicates.
    ///
    /// Exactly one result arrives per invocation. An `Err` ends the run with
    /// a terminal failure outcome; the engine treats all failure causes
    /// uniformly.
    async fn invoke(&self, args: StepOutput, context: &RunContext) -> Result<StepOutput>;
}

impl fmt::Debug for dyn Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name())
            .finish()
    }
}

// ============================================================================
// CLOSURE ADAPTER
// ============================================================================

/// Adapter turning a plain closure into a [`Capability`].
///
/// Covers the common case of small synchronous tools and test fixtures;
/// capabilities that need real I/O implement the trait directly.
pub struct FnCapability {
    name: Arc<str>,
    func: Box<dyn Fn(StepOutput, &RunContext) -> Result<StepOutput> + Send + Sync>,
}

impl FnCapability {
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(StepOutput, &RunContext) -> Result<StepOutput> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Capability for FnCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, args: StepOutput, context: &RunContext) -> Result<StepOutput> {
        (self.func)(args, context)
    }
}

impl fmt::Debug for FnCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCapability")
            .field("name", &self.name)
            .finish()
    }
}

// ============================================================================
// CAPABILITY DIRECTORY
// ============================================================================

/// Concurrent name → capability registry.
///
/// Graph builders use it to wire steps by name; the engine never reads it.
/// Cloning is cheap and all clones share the same entries.
#[derive(Clone, Default)]
pub struct CapabilityDirectory {
    entries: Arc<DashMap<Arc<str>, Arc<dyn Capability>>>,
}

impl CapabilityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under its own name, replacing any previous
    /// entry with that name.
    pub fn register(&self, capability: Arc<dyn Capability>) {
        self.entries
            .insert(Arc::from(capability.name()), capability);
    }

    /// Register a closure-backed capability under `name`.
    pub fn register_fn<F>(&self, name: impl Into<Arc<str>>, func: F)
    where
        F: Fn(StepOutput, &RunContext) -> Result<StepOutput> + Send + Sync + 'static,
    {
        let name = name.into();
        self.register(Arc::new(FnCapability::new(name, func)));
    }

    /// Look up a capability by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Capability>, FlowError> {
        self.entries
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| FlowError::UnknownCapability {
                name: name.to_string(),
            })
    }

    /// Check if a capability is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered capability names, in no particular order.
    pub fn names(&self) -> Vec<Arc<str>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(entry.key()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CapabilityDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDirectory")
            .field("len", &self.len())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
