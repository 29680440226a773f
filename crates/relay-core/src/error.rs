//! Error taxonomy shared across the crate.

use thiserror::Error;

use crate::domain::{CallableRef, DefinitionId, RunId, RunState};

#[derive(Debug, Error)]
pub enum RelayError {
    /// Adding the edge would make the definition depend (transitively) on itself.
    #[error("dependency of {task} on {depends_on} would close a cycle")]
    Cycle {
        task: DefinitionId,
        depends_on: DefinitionId,
    },

    /// No snapshot in the store for this run id.
    #[error("no snapshot for {0}")]
    NotFound(RunId),

    /// The definition id is not registered with the graph.
    #[error("unknown task definition {0}")]
    UnknownDefinition(DefinitionId),

    /// A binding edge points at an upstream whose latest run has no result,
    /// e.g. because the upstream was re-invoked after the run went `Ready`.
    #[error("run {run}: no result from upstream {upstream} for parameter `{param}`")]
    UnresolvedBinding {
        run: RunId,
        upstream: DefinitionId,
        param: String,
    },

    /// The dispatcher (or the callable it invoked) failed.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// Two callables registered under the same reference.
    #[error("duplicate callable for ref `{0}`")]
    DuplicateCallable(CallableRef),

    /// A state transition was attempted from a non-source state.
    #[error("invalid state transition {from} -> {to}")]
    InvalidTransition { from: RunState, to: RunState },

    /// The store backend misbehaved (serialization, I/O, ...).
    #[error("store: {0}")]
    Store(String),
}
