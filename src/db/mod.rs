//! Database assembly pipeline and read side

pub mod build;
pub mod index;
pub mod log;
pub mod merge;
pub mod reader;
pub mod snapshot;
pub mod validate;

pub use build::{
    assemble_database, Assembly, BuildError, BuildInputs, BuildOutcome, BuildPaths, BuildReport,
    BuildRequest, BuildState, Orchestrator, SkipReport,
};
pub use index::{IdentifierIndex, IndexSet, MechanicIndex, TagIndex};
pub use log::{BuildLog, BuildSummary};
pub use merge::{merge, EntityMap, MergeOutput, MergeStats};
pub use reader::{Database, DatabaseError};
pub use snapshot::{DatabaseSnapshot, SnapshotMetadata, TypeCounts, FORMAT_VERSION};
pub use validate::Validator;
