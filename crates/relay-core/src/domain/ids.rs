//! Strongly-typed identifiers backed by ULIDs.
//!
//! ULIDs sort by creation time, which is exactly what the scheduler needs
//! for its deterministic `(queued_at, run_id)` tie-break, and they can be
//! minted without coordination when runs are created in several processes.
//!
//! A single generic `Id<T>` carries a phantom marker type so that a
//! [`DefinitionId`] and a [`RunId`] can never be mixed up at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for identifier kinds.
///
/// Provides the prefix used by `Display` (e.g. `def-`, `run-`).
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed identifier.
///
/// The marker `T` occupies no memory at runtime; it only exists to keep the
/// identifier kinds apart in the type system.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// Mint a fresh identifier from the current wall clock.
    pub fn generate() -> Self {
        Self::from_parts(chrono::Utc::now().timestamp_millis() as u64, rand::random())
    }

    /// Build an identifier from an explicit timestamp and entropy.
    ///
    /// Mostly useful in tests that need a known ordering between ids.
    pub fn from_parts(timestamp_ms: u64, random: u128) -> Self {
        Self::from_ulid(Ulid::from_parts(timestamp_ms, random))
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Marker for task definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Definition {}

impl IdMarker for Definition {
    fn prefix() -> &'static str {
        "def-"
    }
}

/// Marker for task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// Identifier of a [`TaskDefinition`](super::TaskDefinition) (stable across runs).
pub type DefinitionId = Id<Definition>;

/// Identifier of a single [`TaskRun`](super::TaskRun) (unique per invocation).
pub type RunId = Id<Run>;
