//! Run store: durable keyed repository of run snapshots.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;

use crate::domain::{RunId, RunState, TaskRun};
use crate::error::RelayError;

/// Predicate used by [`RunStore::scan`].
pub type ScanPredicate<'a> = &'a (dyn Fn(&TaskRun) -> bool + Send + Sync);

/// Store port (interface).
///
/// The engines depend only on this contract; any backing medium (in-memory
/// map, file, relational store) qualifies as long as:
/// - `save` is atomic with respect to concurrent readers (a reader never
///   observes a half-written snapshot), and
/// - snapshots round-trip with full field fidelity, timestamps included.
///
/// `save_if_state` is the compare-and-swap engines use to claim a run; it is
/// what prevents double dispatch when several engines poll the same store.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Upsert the full snapshot for `run.run_id`.
    async fn save(&self, run: &TaskRun) -> Result<(), RelayError>;

    /// Upsert only if the currently stored snapshot is in `expected` state.
    ///
    /// Returns `false` (without writing) when the stored state differs,
    /// i.e. some other writer got there first. Fails with
    /// [`RelayError::NotFound`] when no snapshot exists.
    async fn save_if_state(&self, run: &TaskRun, expected: RunState)
    -> Result<bool, RelayError>;

    /// Load the snapshot for `run_id`.
    async fn load(&self, run_id: RunId) -> Result<TaskRun, RelayError>;

    /// All current snapshots matching `predicate`.
    ///
    /// Finite per call; reflects the store's state at scan start (read
    /// committed, nothing stronger).
    async fn scan(&self, predicate: ScanPredicate<'_>) -> Result<Vec<TaskRun>, RelayError>;
}
