//! Domain model (ids, definitions, runs, states, outcomes).

pub mod definition;
pub mod ids;
pub mod outcome;
pub mod run;
pub mod state;

pub use definition::{CallableRef, TaskDefinition};
pub use ids::{DefinitionId, RunId};
pub use outcome::RunOutcome;
pub use run::TaskRun;
pub use state::RunState;
