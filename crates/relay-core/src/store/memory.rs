//! In-memory store implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{RunStore, ScanPredicate};
use crate::domain::{RunId, RunState, TaskRun};
use crate::error::RelayError;

/// In-memory [`RunStore`] keyed by run id.
///
/// Snapshots are held as serialized JSON values, so every `save`/`load` pair
/// goes through the same round-trip a file- or database-backed store would.
/// The map lives behind a single async mutex: writers hold it for the whole
/// upsert, so readers never observe a half-written snapshot.
#[derive(Default)]
pub struct InMemoryStore {
    snapshots: Arc<Mutex<HashMap<RunId, serde_json::Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn encode(run: &TaskRun) -> Result<serde_json::Value, RelayError> {
        serde_json::to_value(run).map_err(|e| RelayError::Store(e.to_string()))
    }

    fn decode(snapshot: &serde_json::Value) -> Result<TaskRun, RelayError> {
        serde_json::from_value(snapshot.clone()).map_err(|e| RelayError::Store(e.to_string()))
    }
}

#[async_trait]
impl RunStore for InMemoryStore {
    async fn save(&self, run: &TaskRun) -> Result<(), RelayError> {
        let snapshot = Self::encode(run)?;
        let mut snapshots = self.snapshots.lock().await;
        snapshots.insert(run.run_id, snapshot);
        Ok(())
    }

    async fn save_if_state(
        &self,
        run: &TaskRun,
        expected: RunState,
    ) -> Result<bool, RelayError> {
        let snapshot = Self::encode(run)?;
        let mut snapshots = self.snapshots.lock().await;
        let current = snapshots
            .get(&run.run_id)
            .ok_or(RelayError::NotFound(run.run_id))?;
        if Self::decode(current)?.state != expected {
            return Ok(false);
        }
        snapshots.insert(run.run_id, snapshot);
        Ok(true)
    }

    async fn load(&self, run_id: RunId) -> Result<TaskRun, RelayError> {
        let snapshots = self.snapshots.lock().await;
        let snapshot = snapshots.get(&run_id).ok_or(RelayError::NotFound(run_id))?;
        Self::decode(snapshot)
    }

    async fn scan(&self, predicate: ScanPredicate<'_>) -> Result<Vec<TaskRun>, RelayError> {
        let snapshots = self.snapshots.lock().await;
        let mut matches = Vec::new();
        for snapshot in snapshots.values() {
            let run = Self::decode(snapshot)?;
            if predicate(&run) {
                matches.push(run);
            }
        }
        Ok(matches)
    }
}
