//! Task run: one timed, stateful execution attempt of a definition.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{DefinitionId, RunId, RunOutcome, RunState};
use crate::error::RelayError;

/// A single execution attempt of a [`TaskDefinition`](super::TaskDefinition).
///
/// Design:
/// - This is the snapshot persisted in the [`RunStore`](crate::store::RunStore);
///   it is the single source of truth engines poll against.
/// - All state transitions happen here, and each guard rejects an attempt
///   from a non-source state with [`RelayError::InvalidTransition`] instead
///   of silently ignoring it.
/// - `args`/`kwargs` start as the definition's fixed arguments; binding
///   results are merged into `kwargs` at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub run_id: RunId,
    pub definition_id: DefinitionId,
    pub priority: i64,
    pub state: RunState,

    pub args: Vec<serde_json::Value>,
    pub kwargs: BTreeMap<String, serde_json::Value>,

    pub outcome: RunOutcome,

    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TaskRun {
    /// Create a run in `Init` with the definition's fixed arguments.
    pub fn new(
        definition_id: DefinitionId,
        args: Vec<serde_json::Value>,
        kwargs: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            run_id: RunId::generate(),
            definition_id,
            priority: 0,
            state: RunState::Init,
            args,
            kwargs,
            outcome: RunOutcome::Pending,
            queued_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Guarded transition; the one place `state` is ever written.
    fn transition(&mut self, next: RunState) -> Result<(), RelayError> {
        if !self.state.can_transition_to(next) {
            return Err(RelayError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Queue with at least one unfinished dependency.
    pub fn mark_waiting(&mut self) -> Result<(), RelayError> {
        self.transition(RunState::Waiting)
    }

    /// All dependencies succeeded; eligible for dispatch.
    pub fn mark_ready(&mut self) -> Result<(), RelayError> {
        self.transition(RunState::Ready)
    }

    /// Handed to the dispatcher.
    pub fn mark_running(&mut self) -> Result<(), RelayError> {
        self.transition(RunState::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Terminated successfully with a result.
    pub fn mark_succeeded(&mut self, result: serde_json::Value) -> Result<(), RelayError> {
        self.transition(RunState::Succeeded)?;
        self.outcome = RunOutcome::Success(result);
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Terminated in failure with an error message.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), RelayError> {
        self.transition(RunState::Failed)?;
        self.outcome = RunOutcome::Failure(error.into());
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_failure(&self) -> bool {
        self.state.is_failure()
    }

    pub fn in_finish_state(&self) -> bool {
        self.state.is_terminal()
    }

    /// The success value, if any.
    pub fn result(&self) -> Option<&serde_json::Value> {
        self.outcome.result()
    }

    /// The error message, if any.
    pub fn error(&self) -> Option<&str> {
        self.outcome.error()
    }

    /// Time spent queued before dispatch (derived, not stored).
    pub fn queue_latency(&self) -> Option<Duration> {
        self.started_at.map(|s| s - self.queued_at)
    }

    /// Execution time under the dispatcher (derived, not stored).
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(s), Some(e)) => Some(e - s),
            _ => None,
        }
    }

    /// Queue-to-termination time (derived, not stored).
    pub fn total_latency(&self) -> Option<Duration> {
        self.ended_at.map(|e| e - self.queued_at)
    }
}
