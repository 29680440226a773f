//! Continuously polling asynchronous engine.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Engine;
use super::pass::run_pass;
use crate::dispatch::Dispatcher;
use crate::domain::{RunId, RunState};
use crate::error::RelayError;
use crate::graph::DependencyGraph;
use crate::store::RunStore;

/// Handle to the background scheduling loop.
///
/// Dropping `shutdown_tx` would also stop the loop, but `stop()` goes
/// through the channel explicitly so it can join and guarantee the in-flight
/// pass finished.
struct PollWorker {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Engine that repeats scheduling passes on a background tokio task.
///
/// `start()` spawns the loop and returns immediately; the loop executes a
/// pass, sleeps for `interval`, and repeats until stopped. `stop()` signals
/// shutdown and waits for the current pass to complete, so no pass is ever
/// left half-applied. Both are idempotent, and the engine can be restarted
/// after a stop.
pub struct PollEngine {
    graph: Arc<DependencyGraph>,
    store: Arc<dyn RunStore>,
    dispatcher: Arc<dyn Dispatcher>,
    interval: Duration,
    worker: Mutex<Option<PollWorker>>,
}

impl PollEngine {
    pub fn new(
        graph: Arc<DependencyGraph>,
        store: Arc<dyn RunStore>,
        dispatcher: Arc<dyn Dispatcher>,
        interval: Duration,
    ) -> Self {
        Self {
            graph,
            store,
            dispatcher,
            interval,
            worker: Mutex::new(None),
        }
    }

    /// Is the background loop currently running?
    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }
}

async fn poll_loop(
    graph: Arc<DependencyGraph>,
    store: Arc<dyn RunStore>,
    dispatcher: Arc<dyn Dispatcher>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // Blocked runs already logged; lives as long as the loop, so each run
    // warns once instead of once per interval.
    let mut warned = HashSet::new();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match run_pass(&graph, store.as_ref(), dispatcher.as_ref(), &mut warned).await {
            Ok(report) if report.has_progress() => {
                debug!(
                    promoted = report.promoted,
                    dispatched = report.dispatched,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    "pass complete"
                );
            }
            Ok(_) => {}
            // A failing pass must not kill the loop; the next interval
            // retries against fresh store state.
            Err(err) => warn!(error = %err, "scheduling pass failed"),
        }

        tokio::select! {
            _ = shutdown_rx.changed() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[async_trait]
impl Engine for PollEngine {
    /// Launch the background loop. No-op when already running.
    async fn start(&self) -> Result<(), RelayError> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(poll_loop(
            Arc::clone(&self.graph),
            Arc::clone(&self.store),
            Arc::clone(&self.dispatcher),
            self.interval,
            shutdown_rx,
        ));
        *worker = Some(PollWorker { shutdown_tx, join });
        Ok(())
    }

    /// Signal shutdown and wait for the in-flight pass (if any) to finish.
    /// No-op when not running; the engine may be started again afterwards.
    async fn stop(&self) -> Result<(), RelayError> {
        let Some(PollWorker { shutdown_tx, join }) = self.worker.lock().await.take() else {
            return Ok(());
        };
        // Ignore send errors: the loop may have exited already.
        let _ = shutdown_tx.send(true);
        let _ = join.await;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Callable, CallableRegistry, RegistryDispatcher};
    use crate::domain::{CallableRef, DefinitionId, TaskDefinition};
    use crate::store::InMemoryStore;
    use std::collections::BTreeMap;

    struct Const(serde_json::Value);

    #[async_trait]
    impl Callable for Const {
        async fn call(
            &self,
            _args: &[serde_json::Value],
            _kwargs: &BTreeMap<String, serde_json::Value>,
        ) -> Result<serde_json::Value, RelayError> {
            Ok(self.0.clone())
        }
    }

    struct AddBound;

    #[async_trait]
    impl Callable for AddBound {
        async fn call(
            &self,
            _args: &[serde_json::Value],
            kwargs: &BTreeMap<String, serde_json::Value>,
        ) -> Result<serde_json::Value, RelayError> {
            let c = kwargs["c"].as_i64().unwrap_or(0);
            let d = kwargs["d"].as_i64().unwrap_or(0);
            Ok(serde_json::json!(c + d))
        }
    }

    struct Slow;

    #[async_trait]
    impl Callable for Slow {
        async fn call(
            &self,
            _args: &[serde_json::Value],
            _kwargs: &BTreeMap<String, serde_json::Value>,
        ) -> Result<serde_json::Value, RelayError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(serde_json::json!("slow done"))
        }
    }

    struct Fixture {
        graph: Arc<DependencyGraph>,
        store: Arc<InMemoryStore>,
        engine: PollEngine,
    }

    fn fixture(
        interval: Duration,
        build: impl FnOnce(&mut DependencyGraph, &mut CallableRegistry) -> Vec<DefinitionId>,
    ) -> (Fixture, Vec<DefinitionId>) {
        let mut graph = DependencyGraph::new();
        let mut registry = CallableRegistry::new();
        let ids = build(&mut graph, &mut registry);

        let graph = Arc::new(graph);
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = Arc::new(RegistryDispatcher::new(
            Arc::clone(&graph),
            Arc::new(registry),
        ));
        let engine = PollEngine::new(
            Arc::clone(&graph),
            store.clone() as Arc<dyn RunStore>,
            dispatcher,
            interval,
        );
        (
            Fixture {
                graph,
                store,
                engine,
            },
            ids,
        )
    }

    fn register_const(
        graph: &mut DependencyGraph,
        registry: &mut CallableRegistry,
        name: &str,
        value: serde_json::Value,
    ) -> DefinitionId {
        registry
            .register(CallableRef::new(name), Arc::new(Const(value)))
            .unwrap();
        graph.register(TaskDefinition::new(CallableRef::new(name)))
    }

    /// The full four-task graph: t3 binds t1/t2 results, t4 follows t3.
    fn diamond_chain(
        graph: &mut DependencyGraph,
        registry: &mut CallableRegistry,
    ) -> Vec<DefinitionId> {
        let t1 = register_const(graph, registry, "t1", serde_json::json!(2));
        let t2 = register_const(graph, registry, "t2", serde_json::json!(3));
        registry
            .register(CallableRef::new("t3"), Arc::new(AddBound))
            .unwrap();
        let t3 = graph.register(TaskDefinition::new(CallableRef::new("t3")));
        graph.bind_parameter(t3, t1, "c").unwrap();
        graph.bind_parameter(t3, t2, "d").unwrap();
        let t4 = register_const(graph, registry, "t4", serde_json::json!("done"));
        graph.add_dependency(t4, t3).unwrap();
        vec![t1, t2, t3, t4]
    }

    #[tokio::test]
    async fn background_loop_drains_the_graph_without_manual_passes() {
        let (f, ids) = fixture(Duration::from_millis(100), diamond_chain);

        let mut runs = Vec::new();
        for id in &ids {
            runs.push(f.graph.invoke(*id, f.store.as_ref()).await.unwrap());
        }

        f.engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        for run in &runs {
            assert_eq!(
                f.engine.state_of(run.run_id).await.unwrap(),
                RunState::Succeeded
            );
        }
        assert_eq!(
            f.engine.result_of(runs[2].run_id).await.unwrap(),
            Some(serde_json::json!(5))
        );

        f.engine.stop().await.unwrap();
        assert!(!f.engine.is_running().await);
    }

    #[tokio::test]
    async fn stop_waits_for_the_in_flight_pass() {
        let (f, ids) = fixture(Duration::from_millis(10), |graph, registry| {
            registry
                .register(CallableRef::new("slow"), Arc::new(Slow))
                .unwrap();
            vec![graph.register(TaskDefinition::new(CallableRef::new("slow")))]
        });

        let run = f.graph.invoke(ids[0], f.store.as_ref()).await.unwrap();
        f.engine.start().await.unwrap();
        // Let the loop pick the run up and enter the slow dispatch.
        tokio::time::sleep(Duration::from_millis(50)).await;

        f.engine.stop().await.unwrap();

        // After stop() returns the pass is fully applied: terminal, never
        // stranded in Running.
        let state = f.engine.state_of(run.run_id).await.unwrap();
        assert_eq!(state, RunState::Succeeded);
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent_and_restartable() {
        let (f, ids) = fixture(Duration::from_millis(10), |graph, registry| {
            vec![
                register_const(graph, registry, "a", serde_json::json!(1)),
                register_const(graph, registry, "b", serde_json::json!(2)),
            ]
        });

        // Stop before start: nothing to do.
        f.engine.stop().await.unwrap();

        f.engine.start().await.unwrap();
        f.engine.start().await.unwrap(); // second start is a no-op
        let run_a = f.graph.invoke(ids[0], f.store.as_ref()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        f.engine.stop().await.unwrap();
        f.engine.stop().await.unwrap(); // second stop is a no-op
        assert_eq!(
            f.engine.state_of(run_a.run_id).await.unwrap(),
            RunState::Succeeded
        );

        // Restart picks up work invoked while stopped.
        let run_b = f.graph.invoke(ids[1], f.store.as_ref()).await.unwrap();
        f.engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        f.engine.stop().await.unwrap();
        assert_eq!(
            f.engine.state_of(run_b.run_id).await.unwrap(),
            RunState::Succeeded
        );
    }
}
