//! relay-core
//!
//! Dependency-driven task execution engine: runs units of work only after
//! their declared upstream dependencies have succeeded, injects dependency
//! results into downstream call arguments, and keeps a durable, inspectable
//! snapshot of every invocation attempt.
//!
//! # Module layout
//! - **domain**: ids, definitions, runs, the run state machine, outcomes
//! - **graph**: the DAG of definitions; acyclicity, readiness, bindings
//! - **store**: the `RunStore` port plus an in-memory implementation
//! - **dispatch**: the `Dispatcher` port and the callable registry
//! - **engine**: the shared pass, `StepEngine` and `PollEngine`
//!
//! Declaring work (building the graph, invoking definitions) is decoupled
//! from running it (engines polling the store), so the two can live in
//! different processes as long as they share a store and register the same
//! callable refs.

pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod error;
pub mod graph;
pub mod store;

pub use dispatch::{Callable, CallableRegistry, Dispatcher, RegistryDispatcher};
pub use domain::{
    CallableRef, DefinitionId, RunId, RunOutcome, RunState, TaskDefinition, TaskRun,
};
pub use engine::{Engine, PassReport, PollEngine, StepEngine};
pub use error::RelayError;
pub use graph::DependencyGraph;
pub use store::{InMemoryStore, RunStore};
