//! Engines: promote-and-dispatch scheduling over a run store.
//!
//! Two implementations share one execution contract (one *pass*, see
//! [`pass`]): [`StepEngine`] performs exactly one pass per call on the
//! caller's thread of control, [`PollEngine`] repeats passes on a background
//! tokio task until stopped.

mod pass;
mod poll;
mod step;

pub use pass::PassReport;
pub use poll::PollEngine;
pub use step::StepEngine;

use async_trait::async_trait;

use crate::domain::{RunId, RunState};
use crate::error::RelayError;
use crate::store::RunStore;

/// Engine control surface.
///
/// `start`/`stop` drive scheduling; the accessors are the read side callers
/// use to poll a run to completion. Callers observe task failure through
/// [`Engine::state_of`] / [`Engine::error_of`], never through an error
/// propagated out of the engine.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn start(&self) -> Result<(), RelayError>;

    async fn stop(&self) -> Result<(), RelayError>;

    /// Current state of a run.
    async fn state_of(&self, run_id: RunId) -> Result<RunState, RelayError>;

    /// Result of a run, if it terminated successfully.
    async fn result_of(&self, run_id: RunId) -> Result<Option<serde_json::Value>, RelayError>;

    /// Error of a run, if it terminated in failure.
    async fn error_of(&self, run_id: RunId) -> Result<Option<String>, RelayError>;
}

pub(crate) async fn state_of(store: &dyn RunStore, run_id: RunId) -> Result<RunState, RelayError> {
    Ok(store.load(run_id).await?.state)
}

pub(crate) async fn result_of(
    store: &dyn RunStore,
    run_id: RunId,
) -> Result<Option<serde_json::Value>, RelayError> {
    Ok(store.load(run_id).await?.result().cloned())
}

pub(crate) async fn error_of(
    store: &dyn RunStore,
    run_id: RunId,
) -> Result<Option<String>, RelayError> {
    Ok(store.load(run_id).await?.error().map(str::to_owned))
}
