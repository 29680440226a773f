//! Synchronous step-wise engine.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::Engine;
use super::pass::{PassReport, run_pass};
use crate::dispatch::Dispatcher;
use crate::domain::{RunId, RunState, TaskRun};
use crate::error::RelayError;
use crate::graph::DependencyGraph;
use crate::store::RunStore;

/// Engine that advances the graph exactly one pass per [`StepEngine::step`]
/// call, on the caller's task.
///
/// Each pass dispatches one topological "wave"; callers needing a full drain
/// loop until nothing is `Waiting`/`Ready` (or use [`StepEngine::drain`]).
/// Deterministic and single-threaded, which is what makes it the engine of
/// choice for tests and synchronous hosts.
pub struct StepEngine {
    graph: Arc<DependencyGraph>,
    store: Arc<dyn RunStore>,
    dispatcher: Arc<dyn Dispatcher>,
    // Blocked runs already logged, so repeated passes warn once per run.
    warned: Mutex<HashSet<RunId>>,
}

impl StepEngine {
    pub fn new(
        graph: Arc<DependencyGraph>,
        store: Arc<dyn RunStore>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            graph,
            store,
            dispatcher,
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Execute exactly one pass.
    pub async fn step(&self) -> Result<PassReport, RelayError> {
        let mut warned = self.warned.lock().await;
        run_pass(
            &self.graph,
            self.store.as_ref(),
            self.dispatcher.as_ref(),
            &mut warned,
        )
        .await
    }

    /// Step until no `Waiting`/`Ready` run remains, or until a pass makes no
    /// progress (runs blocked behind a failed upstream stay `Waiting`
    /// forever; looping further would spin).
    pub async fn drain(&self) -> Result<PassReport, RelayError> {
        let mut total = PassReport::default();
        loop {
            let report = self.step().await?;
            total.promoted += report.promoted;
            total.dispatched += report.dispatched;
            total.succeeded += report.succeeded;
            total.failed += report.failed;
            total.blocked += report.blocked;

            let pending = self
                .store
                .scan(&|r: &TaskRun| {
                    matches!(r.state, RunState::Waiting | RunState::Ready)
                })
                .await?;
            if pending.is_empty() || !report.has_progress() {
                return Ok(total);
            }
        }
    }
}

#[async_trait]
impl Engine for StepEngine {
    /// One pass, synchronously.
    async fn start(&self) -> Result<(), RelayError> {
        self.step().await.map(|_| ())
    }

    /// Nothing to cancel.
    async fn stop(&self) -> Result<(), RelayError> {
        Ok(())
    }

    async fn state_of(&self, run_id: RunId) -> Result<RunState, RelayError> {
        super::state_of(self.store.as_ref(), run_id).await
    }

    async fn result_of(&self, run_id: RunId) -> Result<Option<serde_json::Value>, RelayError> {
        super::result_of(self.store.as_ref(), run_id).await
    }

    async fn error_of(&self, run_id: RunId) -> Result<Option<String>, RelayError> {
        super::error_of(self.store.as_ref(), run_id).await
    }
}
