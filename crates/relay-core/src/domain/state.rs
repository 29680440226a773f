//! Run state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a single task run.
///
/// Transitions:
/// - `Init -> Waiting` (queued with at least one unfinished dependency)
/// - `Init -> Ready` (queued with no unfinished dependency)
/// - `Waiting -> Ready` (all dependencies succeeded)
/// - `Ready -> Running` (handed to the dispatcher)
/// - `Running -> Succeeded | Failed` (dispatcher outcome, terminal)
///
/// No transition may skip a state; [`RunState::can_transition_to`] is the
/// single place the legal edges are written down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Constructed, not yet queued.
    Init,

    /// Queued; at least one dependency has not yet succeeded.
    Waiting,

    /// Queued; every dependency has succeeded. Eligible for dispatch.
    Ready,

    /// Currently executing under a dispatcher.
    Running,

    /// Finished with a result (terminal).
    Succeeded,

    /// Finished with an error (terminal).
    Failed,
}

impl RunState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }

    /// Did the run terminate unsuccessfully?
    pub fn is_failure(self) -> bool {
        self == RunState::Failed
    }

    /// Is the transition `self -> next` one of the legal edges?
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Init, RunState::Waiting)
                | (RunState::Init, RunState::Ready)
                | (RunState::Waiting, RunState::Ready)
                | (RunState::Ready, RunState::Running)
                | (RunState::Running, RunState::Succeeded)
                | (RunState::Running, RunState::Failed)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "INIT",
            RunState::Waiting => "WAITING",
            RunState::Ready => "READY",
            RunState::Running => "RUNNING",
            RunState::Succeeded => "SUCCEEDED",
            RunState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}
