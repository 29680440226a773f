//! One scheduling pass, shared by both engines.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::dispatch::Dispatcher;
use crate::domain::{RunId, RunState, TaskRun};
use crate::error::RelayError;
use crate::graph::DependencyGraph;
use crate::store::RunStore;

/// Counters for one promote-and-dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Runs promoted `Waiting -> Ready`.
    pub promoted: usize,
    /// Runs handed to the dispatcher.
    pub dispatched: usize,
    /// Dispatched runs that terminated successfully.
    pub succeeded: usize,
    /// Dispatched runs that terminated in failure.
    pub failed: usize,
    /// Runs newly observed waiting behind a failed upstream.
    pub blocked: usize,
}

impl PassReport {
    /// Did this pass move any run forward?
    pub fn has_progress(&self) -> bool {
        self.promoted > 0 || self.dispatched > 0
    }
}

/// Execute one pass:
///
/// 1. promote every `Waiting` run whose dependencies have all succeeded,
/// 2. collect `Ready` runs in `(queued_at, run_id)` order,
/// 3. for each: resolve bindings, claim `Ready -> Running` via
///    compare-and-swap, dispatch, record the terminal outcome.
///
/// A dispatch error is recorded as the run's failure and never aborts the
/// pass. Dependents of a failed upstream stay `Waiting`; each is logged once
/// (tracked through `warned`) so the blockage is visible without flooding a
/// long-lived polling loop.
pub(crate) async fn run_pass(
    graph: &DependencyGraph,
    store: &dyn RunStore,
    dispatcher: &dyn Dispatcher,
    warned: &mut HashSet<RunId>,
) -> Result<PassReport, RelayError> {
    let mut report = PassReport::default();

    for mut run in graph.ready_set(store).await? {
        run.mark_ready()?;
        if store.save_if_state(&run, RunState::Waiting).await? {
            debug!(run_id = %run.run_id, "promoted to READY");
            report.promoted += 1;
        }
    }

    for run in store
        .scan(&|r: &TaskRun| r.state == RunState::Waiting)
        .await?
    {
        if warned.contains(&run.run_id) {
            continue;
        }
        if graph.blocked_by_failure(&run, store).await? {
            warn!(
                run_id = %run.run_id,
                "waiting on a failed upstream; will never be promoted"
            );
            warned.insert(run.run_id);
            report.blocked += 1;
        }
    }

    let mut runnable = store
        .scan(&|r: &TaskRun| r.state == RunState::Ready)
        .await?;
    runnable.sort_by_key(|r| (r.queued_at, r.run_id));

    for mut run in runnable {
        match graph.resolve_bindings(&mut run, store).await {
            Ok(()) => {}
            // A bound upstream has been re-invoked and its fresh run has no
            // result yet. Leave this run READY; a later pass resolves it
            // once the upstream terminates again.
            Err(RelayError::UnresolvedBinding { upstream, param, .. }) => {
                debug!(
                    run_id = %run.run_id,
                    %upstream,
                    param = %param,
                    "binding not yet resolvable; deferring to a later pass"
                );
                continue;
            }
            Err(err) => return Err(err),
        }
        run.mark_running()?;
        if !store.save_if_state(&run, RunState::Ready).await? {
            // Another engine claimed it between scan and save.
            continue;
        }
        report.dispatched += 1;

        match dispatcher.dispatch(&run).await {
            Ok(result) => {
                debug!(run_id = %run.run_id, "run succeeded");
                run.mark_succeeded(result)?;
                report.succeeded += 1;
            }
            Err(err) => {
                warn!(run_id = %run.run_id, error = %err, "run failed");
                run.mark_failed(err.to_string())?;
                report.failed += 1;
            }
        }
        store.save(&run).await?;
    }

    Ok(report)
}
