//! Task definitions: immutable descriptions of one unit of work.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::DefinitionId;

/// Opaque reference to executable logic.
///
/// The core never interprets this; the dispatcher resolves it against a
/// registry of callables. Keeping it a stable string (instead of a function
/// pointer) is what lets a run saved by one process be dispatched by another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallableRef(String);

impl CallableRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Immutable description of one unit of work.
///
/// A definition carries the callable reference and the fixed call arguments;
/// dependency and binding edges live on the
/// [`DependencyGraph`](crate::graph::DependencyGraph). Once registered with a
/// graph, a definition is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    id: DefinitionId,
    callable_ref: CallableRef,
    fixed_args: Vec<serde_json::Value>,
    fixed_kwargs: BTreeMap<String, serde_json::Value>,
}

impl TaskDefinition {
    pub fn new(callable_ref: CallableRef) -> Self {
        Self {
            id: DefinitionId::generate(),
            callable_ref,
            fixed_args: Vec::new(),
            fixed_kwargs: BTreeMap::new(),
        }
    }

    /// Append a fixed positional argument.
    pub fn with_arg(mut self, value: serde_json::Value) -> Self {
        self.fixed_args.push(value);
        self
    }

    /// Set a fixed keyword argument.
    pub fn with_kwarg(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fixed_kwargs.insert(name.into(), value);
        self
    }

    pub fn id(&self) -> DefinitionId {
        self.id
    }

    pub fn callable_ref(&self) -> &CallableRef {
        &self.callable_ref
    }

    pub fn fixed_args(&self) -> &[serde_json::Value] {
        &self.fixed_args
    }

    pub fn fixed_kwargs(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.fixed_kwargs
    }
}
