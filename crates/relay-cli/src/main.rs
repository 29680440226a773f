//! Demo: a four-task graph under the polling engine.
//!
//! t1 and t2 produce numbers, t3 receives both results as bound keywords
//! and sums them, t4 runs after t3. Everything is invoked up front; the
//! `PollEngine` drains the graph generation by generation in the background
//! while main polls run states through the engine's read surface.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use relay_core::{
    Callable, CallableRef, CallableRegistry, DependencyGraph, Engine, InMemoryStore, PollEngine,
    RegistryDispatcher, RelayError, RunStore, TaskDefinition,
};

struct Produce(i64);

#[async_trait]
impl Callable for Produce {
    async fn call(
        &self,
        _args: &[serde_json::Value],
        _kwargs: &BTreeMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, RelayError> {
        Ok(serde_json::json!(self.0))
    }
}

struct Sum;

#[async_trait]
impl Callable for Sum {
    async fn call(
        &self,
        _args: &[serde_json::Value],
        kwargs: &BTreeMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, RelayError> {
        let c = kwargs
            .get("c")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| RelayError::Dispatch("missing bound parameter `c`".to_string()))?;
        let d = kwargs
            .get("d")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| RelayError::Dispatch("missing bound parameter `d`".to_string()))?;
        Ok(serde_json::json!(c + d))
    }
}

struct Announce;

#[async_trait]
impl Callable for Announce {
    async fn call(
        &self,
        _args: &[serde_json::Value],
        _kwargs: &BTreeMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, RelayError> {
        println!("all upstream work finished");
        Ok(serde_json::json!("announced"))
    }
}

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    tracing_subscriber::fmt::init();

    // (A) Wire the graph: t3 binds t1/t2 results, t4 follows t3.
    let mut graph = DependencyGraph::new();
    let t1 = graph.register(TaskDefinition::new(CallableRef::new("produce.two")));
    let t2 = graph.register(TaskDefinition::new(CallableRef::new("produce.three")));
    let t3 = graph.register(TaskDefinition::new(CallableRef::new("sum")));
    let t4 = graph.register(TaskDefinition::new(CallableRef::new("announce")));
    graph.bind_parameter(t3, t1, "c")?;
    graph.bind_parameter(t3, t2, "d")?;
    graph.add_dependency(t4, t3)?;

    // (B) Register the callables the dispatcher resolves refs against.
    let mut registry = CallableRegistry::new();
    registry.register(CallableRef::new("produce.two"), Arc::new(Produce(2)))?;
    registry.register(CallableRef::new("produce.three"), Arc::new(Produce(3)))?;
    registry.register(CallableRef::new("sum"), Arc::new(Sum))?;
    registry.register(CallableRef::new("announce"), Arc::new(Announce))?;

    let graph = Arc::new(graph);
    let store: Arc<dyn RunStore> = Arc::new(InMemoryStore::new());
    let dispatcher = Arc::new(RegistryDispatcher::new(
        Arc::clone(&graph),
        Arc::new(registry),
    ));

    // (C) Invoke everything up front; downstream runs start out WAITING.
    let mut runs = Vec::new();
    for id in [t1, t2, t3, t4] {
        let run = graph.invoke(id, store.as_ref()).await?;
        println!("invoked {id}: run={} state={}", run.run_id, run.state);
        runs.push(run);
    }

    // (D) Let the polling engine drain the graph in the background.
    let engine = PollEngine::new(
        Arc::clone(&graph),
        Arc::clone(&store),
        dispatcher,
        Duration::from_millis(100),
    );
    engine.start().await?;
    tracing::info!("poll engine started; waiting for the graph to drain");

    loop {
        let mut all_terminal = true;
        for run in &runs {
            if !engine.state_of(run.run_id).await?.is_terminal() {
                all_terminal = false;
                break;
            }
        }
        if all_terminal {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }

    for run in &runs {
        let state = engine.state_of(run.run_id).await?;
        let result = engine.result_of(run.run_id).await?;
        let loaded = store.load(run.run_id).await?;
        println!(
            "run {}: state={} result={:?} total_latency={:?}",
            run.run_id,
            state,
            result,
            loaded.total_latency().map(|d| d.to_std().unwrap_or_default()),
        );
    }

    engine.stop().await?;
    Ok(())
}
