//! Dependency graph: definitions plus ordering/binding edges.
//!
//! Design:
//! - Forward edges: definition -> definitions it waits for.
//! - Reverse edges: definition -> definitions waiting for it.
//! - Invariant: the edge set is a DAG; `add_edge` refuses any edge that
//!   would close a cycle and leaves the graph untouched.
//!
//! The graph is built once per session and read-only during scheduling. It
//! never owns run state; readiness questions are answered against a
//! [`RunStore`] snapshot, which is what lets several engines (possibly in
//! other processes) share one graph description.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::domain::{DefinitionId, RunState, TaskDefinition, TaskRun};
use crate::error::RelayError;
use crate::store::RunStore;

/// One dependency edge, optionally carrying a parameter binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// The definition this edge waits for.
    pub upstream: DefinitionId,
    /// When set, the upstream's result is injected under this keyword at
    /// dispatch time (binding edge); when `None` it is ordering only.
    pub binding: Option<String>,
}

/// In-memory DAG of task definitions.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    definitions: HashMap<DefinitionId, TaskDefinition>,

    /// Forward edges: definition -> edges to definitions it waits for.
    upstream: HashMap<DefinitionId, Vec<Edge>>,

    /// Reverse edges: definition -> definitions waiting for it.
    downstream: HashMap<DefinitionId, HashSet<DefinitionId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Definitions are immutable afterwards.
    pub fn register(&mut self, definition: TaskDefinition) -> DefinitionId {
        let id = definition.id();
        self.definitions.insert(id, definition);
        id
    }

    pub fn definition(&self, id: DefinitionId) -> Result<&TaskDefinition, RelayError> {
        self.definitions
            .get(&id)
            .ok_or(RelayError::UnknownDefinition(id))
    }

    /// Ordering edge: `task` may not run until `depends_on` has terminated.
    pub fn add_dependency(
        &mut self,
        task: DefinitionId,
        depends_on: DefinitionId,
    ) -> Result<&mut Self, RelayError> {
        self.add_edge(task, depends_on, None)
    }

    /// Binding edge: ordering plus injection of `depends_on`'s result as
    /// keyword `param` into `task`'s invocation at dispatch time.
    pub fn bind_parameter(
        &mut self,
        task: DefinitionId,
        depends_on: DefinitionId,
        param: impl Into<String>,
    ) -> Result<&mut Self, RelayError> {
        self.add_edge(task, depends_on, Some(param.into()))
    }

    fn add_edge(
        &mut self,
        task: DefinitionId,
        depends_on: DefinitionId,
        binding: Option<String>,
    ) -> Result<&mut Self, RelayError> {
        self.definition(task)?;
        self.definition(depends_on)?;

        // Reject before mutating so a failed add leaves the graph unchanged.
        if task == depends_on || self.reaches(depends_on, task) {
            return Err(RelayError::Cycle { task, depends_on });
        }

        self.upstream.entry(task).or_default().push(Edge {
            upstream: depends_on,
            binding,
        });
        self.downstream.entry(depends_on).or_default().insert(task);
        Ok(self)
    }

    /// Depth-first reachability over forward edges: does `from` (transitively)
    /// wait for `target`?
    fn reaches(&self, from: DefinitionId, target: DefinitionId) -> bool {
        let mut stack = vec![from];
        let mut visited = HashSet::new();
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            for edge in self.dependencies_of(node) {
                stack.push(edge.upstream);
            }
        }
        false
    }

    /// Immediate dependency edges of a definition.
    pub fn dependencies_of(&self, id: DefinitionId) -> &[Edge] {
        self.upstream.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Definitions that directly depend on `id`.
    pub fn dependents_of(&self, id: DefinitionId) -> Vec<DefinitionId> {
        self.downstream
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Invoke a definition: create its run, compute the initial state
    /// (`Ready` when every dependency already succeeded, `Waiting`
    /// otherwise) and save the snapshot.
    pub async fn invoke(
        &self,
        id: DefinitionId,
        store: &dyn RunStore,
    ) -> Result<TaskRun, RelayError> {
        let definition = self.definition(id)?;
        let mut run = TaskRun::new(
            id,
            definition.fixed_args().to_vec(),
            definition.fixed_kwargs().clone(),
        );

        if self.dependencies_satisfied(id, store).await? {
            run.mark_ready()?;
        } else {
            run.mark_waiting()?;
        }
        debug!(run_id = %run.run_id, state = %run.state, "invoked {id}");

        store.save(&run).await?;
        Ok(run)
    }

    /// The latest run of a definition, by `(queued_at, run_id)`.
    ///
    /// A definition may be invoked multiple times; dependency checks and
    /// bindings always look at the most recent invocation.
    pub async fn latest_run_of(
        &self,
        id: DefinitionId,
        store: &dyn RunStore,
    ) -> Result<Option<TaskRun>, RelayError> {
        let runs = store.scan(&move |r: &TaskRun| r.definition_id == id).await?;
        Ok(runs.into_iter().max_by_key(|r| (r.queued_at, r.run_id)))
    }

    /// Has every dependency of `id` a latest run in `Succeeded`?
    async fn dependencies_satisfied(
        &self,
        id: DefinitionId,
        store: &dyn RunStore,
    ) -> Result<bool, RelayError> {
        for edge in self.dependencies_of(id) {
            match self.latest_run_of(edge.upstream, store).await? {
                Some(run) if run.state == RunState::Succeeded => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    /// All `Waiting` runs whose every predecessor has succeeded, in the
    /// deterministic `(queued_at, run_id)` order.
    pub async fn ready_set(&self, store: &dyn RunStore) -> Result<Vec<TaskRun>, RelayError> {
        let waiting = store.scan(&|r: &TaskRun| r.state == RunState::Waiting).await?;

        let mut promotable = Vec::new();
        for run in waiting {
            if self.dependencies_satisfied(run.definition_id, store).await? {
                promotable.push(run);
            }
        }
        promotable.sort_by_key(|r| (r.queued_at, r.run_id));
        Ok(promotable)
    }

    /// Is this `Waiting` run blocked by a failed upstream (and so will never
    /// be promoted under the block-forever policy)?
    pub async fn blocked_by_failure(
        &self,
        run: &TaskRun,
        store: &dyn RunStore,
    ) -> Result<bool, RelayError> {
        for edge in self.dependencies_of(run.definition_id) {
            if let Some(upstream) = self.latest_run_of(edge.upstream, store).await?
                && upstream.is_failure()
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Merge every binding edge's upstream result into `run.kwargs`.
    ///
    /// Fails with [`RelayError::UnresolvedBinding`] when a result is absent.
    /// Reachable after a bound upstream is re-invoked: the latest upstream
    /// run is then pre-terminal with nothing to inject yet.
    pub async fn resolve_bindings(
        &self,
        run: &mut TaskRun,
        store: &dyn RunStore,
    ) -> Result<(), RelayError> {
        for edge in self.dependencies_of(run.definition_id) {
            let Some(param) = &edge.binding else {
                continue;
            };
            let result = match self.latest_run_of(edge.upstream, store).await? {
                Some(upstream) => upstream.result().cloned(),
                None => None,
            };
            let Some(value) = result else {
                return Err(RelayError::UnresolvedBinding {
                    run: run.run_id,
                    upstream: edge.upstream,
                    param: param.clone(),
                });
            };
            run.kwargs.insert(param.clone(), value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CallableRef;
    use crate::store::InMemoryStore;

    fn def(graph: &mut DependencyGraph, name: &str) -> DefinitionId {
        graph.register(TaskDefinition::new(CallableRef::new(name)))
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut graph = DependencyGraph::new();
        let a = def(&mut graph, "a");

        let err = graph.add_dependency(a, a).unwrap_err();
        assert!(matches!(err, RelayError::Cycle { .. }));
    }

    #[test]
    fn two_node_cycle_is_rejected_and_graph_unchanged() {
        let mut graph = DependencyGraph::new();
        let a = def(&mut graph, "a");
        let b = def(&mut graph, "b");

        graph.add_dependency(b, a).unwrap();
        let err = graph.add_dependency(a, b).unwrap_err();
        assert!(matches!(err, RelayError::Cycle { .. }));

        // The rejected edge left no trace.
        assert!(graph.dependencies_of(a).is_empty());
        assert_eq!(graph.dependents_of(b), Vec::new());
        assert_eq!(graph.dependencies_of(b).len(), 1);
    }

    #[test]
    fn longer_cycle_is_rejected() {
        let mut graph = DependencyGraph::new();
        let a = def(&mut graph, "a");
        let b = def(&mut graph, "b");
        let c = def(&mut graph, "c");
        let d = def(&mut graph, "d");

        // a <- b <- c <- d, then closing d -> b's chain back onto b fails.
        graph.add_dependency(b, a).unwrap();
        graph.add_dependency(c, b).unwrap();
        graph.add_dependency(d, c).unwrap();
        let err = graph.add_dependency(b, d).unwrap_err();
        assert!(matches!(err, RelayError::Cycle { .. }));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let mut graph = DependencyGraph::new();
        let a = def(&mut graph, "a");
        let b = def(&mut graph, "b");
        let c = def(&mut graph, "c");

        graph.add_dependency(b, a).unwrap();
        graph.add_dependency(c, b).unwrap();
        // Shortcut edge c -> a converges, but does not cycle.
        graph.add_dependency(c, a).unwrap();
        assert_eq!(graph.dependencies_of(c).len(), 2);
    }

    #[test]
    fn edges_require_registered_definitions() {
        let mut graph = DependencyGraph::new();
        let a = def(&mut graph, "a");
        let ghost = DefinitionId::generate();

        let err = graph.add_dependency(a, ghost).unwrap_err();
        assert!(matches!(err, RelayError::UnknownDefinition(_)));
    }

    #[tokio::test]
    async fn invoke_without_dependencies_is_ready() {
        let mut graph = DependencyGraph::new();
        let a = def(&mut graph, "a");
        let store = InMemoryStore::new();

        let run = graph.invoke(a, &store).await.unwrap();
        assert_eq!(run.state, RunState::Ready);

        // And the snapshot is already persisted.
        let loaded = store.load(run.run_id).await.unwrap();
        assert_eq!(loaded, run);
    }

    #[tokio::test]
    async fn invoke_with_unfinished_dependency_is_waiting() {
        let mut graph = DependencyGraph::new();
        let a = def(&mut graph, "a");
        let b = def(&mut graph, "b");
        graph.add_dependency(b, a).unwrap();
        let store = InMemoryStore::new();

        // a has never been invoked, so b must wait.
        let run_b = graph.invoke(b, &store).await.unwrap();
        assert_eq!(run_b.state, RunState::Waiting);
    }

    #[tokio::test]
    async fn invoke_after_upstream_success_is_ready() {
        let mut graph = DependencyGraph::new();
        let a = def(&mut graph, "a");
        let b = def(&mut graph, "b");
        graph.add_dependency(b, a).unwrap();
        let store = InMemoryStore::new();

        let mut run_a = graph.invoke(a, &store).await.unwrap();
        run_a.mark_running().unwrap();
        run_a.mark_succeeded(serde_json::json!(1)).unwrap();
        store.save(&run_a).await.unwrap();

        let run_b = graph.invoke(b, &store).await.unwrap();
        assert_eq!(run_b.state, RunState::Ready);
    }

    #[tokio::test]
    async fn ready_set_orders_by_queued_at_then_run_id() {
        let mut graph = DependencyGraph::new();
        let root = def(&mut graph, "root");
        let x = def(&mut graph, "x");
        let y = def(&mut graph, "y");
        graph.add_dependency(x, root).unwrap();
        graph.add_dependency(y, root).unwrap();
        let store = InMemoryStore::new();

        let mut run_root = graph.invoke(root, &store).await.unwrap();
        // Invoke x and y while root is unfinished so both start Waiting.
        let mut run_x = graph.invoke(x, &store).await.unwrap();
        let run_y = graph.invoke(y, &store).await.unwrap();

        run_root.mark_running().unwrap();
        run_root.mark_succeeded(serde_json::json!(null)).unwrap();
        store.save(&run_root).await.unwrap();

        // Force a known order regardless of wall-clock resolution.
        run_x.queued_at = run_y.queued_at + chrono::Duration::milliseconds(5);
        store.save(&run_x).await.unwrap();
        store.save(&run_y).await.unwrap();

        let ready = graph.ready_set(&store).await.unwrap();
        let ids: Vec<_> = ready.iter().map(|r| r.run_id).collect();
        assert_eq!(ids, vec![run_y.run_id, run_x.run_id]);
    }

    #[tokio::test]
    async fn ready_set_excludes_runs_with_unfinished_dependencies() {
        let mut graph = DependencyGraph::new();
        let a = def(&mut graph, "a");
        let b = def(&mut graph, "b");
        graph.add_dependency(b, a).unwrap();
        let store = InMemoryStore::new();

        graph.invoke(a, &store).await.unwrap(); // Ready, not Succeeded.
        graph.invoke(b, &store).await.unwrap(); // Waiting on a.

        assert!(graph.ready_set(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolve_bindings_injects_upstream_results() {
        let mut graph = DependencyGraph::new();
        let a = def(&mut graph, "a");
        let b = def(&mut graph, "b");
        let c = def(&mut graph, "c");
        graph.bind_parameter(c, a, "left").unwrap();
        graph.bind_parameter(c, b, "right").unwrap();
        let store = InMemoryStore::new();

        for (id, value) in [(a, serde_json::json!(2)), (b, serde_json::json!(3))] {
            let mut run = graph.invoke(id, &store).await.unwrap();
            run.mark_running().unwrap();
            run.mark_succeeded(value).unwrap();
            store.save(&run).await.unwrap();
        }

        let mut run_c = graph.invoke(c, &store).await.unwrap();
        graph.resolve_bindings(&mut run_c, &store).await.unwrap();
        assert_eq!(run_c.kwargs["left"], serde_json::json!(2));
        assert_eq!(run_c.kwargs["right"], serde_json::json!(3));
    }

    #[tokio::test]
    async fn resolve_bindings_without_upstream_result_fails() {
        let mut graph = DependencyGraph::new();
        let a = def(&mut graph, "a");
        let b = def(&mut graph, "b");
        graph.bind_parameter(b, a, "input").unwrap();
        let store = InMemoryStore::new();

        let mut run_b = graph.invoke(b, &store).await.unwrap();
        let err = graph.resolve_bindings(&mut run_b, &store).await.unwrap_err();
        assert!(matches!(err, RelayError::UnresolvedBinding { .. }));
    }

    #[tokio::test]
    async fn binding_reads_latest_invocation_of_upstream() {
        let mut graph = DependencyGraph::new();
        let a = def(&mut graph, "a");
        let b = def(&mut graph, "b");
        graph.bind_parameter(b, a, "input").unwrap();
        let store = InMemoryStore::new();

        for (offset_ms, value) in [(0, serde_json::json!("old")), (10, serde_json::json!("new"))] {
            let mut run = graph.invoke(a, &store).await.unwrap();
            run.queued_at += chrono::Duration::milliseconds(offset_ms);
            run.mark_running().unwrap();
            run.mark_succeeded(value).unwrap();
            store.save(&run).await.unwrap();
        }

        let mut run_b = graph.invoke(b, &store).await.unwrap();
        graph.resolve_bindings(&mut run_b, &store).await.unwrap();
        assert_eq!(run_b.kwargs["input"], serde_json::json!("new"));
    }
}
