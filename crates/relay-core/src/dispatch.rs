//! Dispatch: resolving a run snapshot back to executable logic.
//!
//! The engines only know the [`Dispatcher`] trait; the embedding application
//! supplies the implementation. [`RegistryDispatcher`] is the reference one:
//! a registry maps stable string refs to [`Callable`] handlers, so a run
//! saved by one process can be dispatched by another that registered the
//! same refs — no reflection, no hidden state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{CallableRef, TaskRun};
use crate::error::RelayError;
use crate::graph::DependencyGraph;

/// Executable logic behind a [`CallableRef`].
///
/// Receives the run's positional and keyword arguments (fixed arguments
/// merged with injected bindings) and returns the result value recorded in
/// the run snapshot.
#[async_trait]
pub trait Callable: Send + Sync {
    async fn call(
        &self,
        args: &[serde_json::Value],
        kwargs: &BTreeMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, RelayError>;
}

/// Externally supplied execution callback.
///
/// Must be resolvable purely from the run snapshot (`definition_id`, `args`,
/// `kwargs`). A returned error is recorded as the run's terminal failure; it
/// never propagates out of an engine pass.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, run: &TaskRun) -> Result<serde_json::Value, RelayError>;
}

/// Registry of callables (ref -> handler).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during dispatch (immutable, behind an `Arc`).
/// This avoids locks on the hot path.
#[derive(Default)]
pub struct CallableRegistry {
    callables: HashMap<CallableRef, Arc<dyn Callable>>,
}

impl CallableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callable. Duplicate refs are rejected so a misconfigured
    /// embedder fails at startup, not at dispatch time.
    pub fn register(
        &mut self,
        callable_ref: CallableRef,
        callable: Arc<dyn Callable>,
    ) -> Result<(), RelayError> {
        if self.callables.contains_key(&callable_ref) {
            return Err(RelayError::DuplicateCallable(callable_ref));
        }
        self.callables.insert(callable_ref, callable);
        Ok(())
    }

    pub fn get(&self, callable_ref: &CallableRef) -> Option<&Arc<dyn Callable>> {
        self.callables.get(callable_ref)
    }

    pub fn len(&self) -> usize {
        self.callables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callables.is_empty()
    }
}

/// Reference [`Dispatcher`]: `definition_id` -> definition -> callable ref
/// -> registered handler.
pub struct RegistryDispatcher {
    graph: Arc<DependencyGraph>,
    registry: Arc<CallableRegistry>,
}

impl RegistryDispatcher {
    pub fn new(graph: Arc<DependencyGraph>, registry: Arc<CallableRegistry>) -> Self {
        Self { graph, registry }
    }
}

#[async_trait]
impl Dispatcher for RegistryDispatcher {
    async fn dispatch(&self, run: &TaskRun) -> Result<serde_json::Value, RelayError> {
        let definition = self.graph.definition(run.definition_id)?;
        let callable = self
            .registry
            .get(definition.callable_ref())
            .ok_or_else(|| {
                RelayError::Dispatch(format!(
                    "no callable registered for ref `{}`",
                    definition.callable_ref()
                ))
            })?;
        callable.call(&run.args, &run.kwargs).await
    }
}
