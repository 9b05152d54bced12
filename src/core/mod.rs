//! Core module - fundamental types and utilities

pub mod config;
pub mod entity;
pub mod identity;
pub mod issue;
pub mod loader;
pub mod overrides;
pub mod project;

pub use config::{Config, ConfigError};
pub use entity::{EntityRecord, Provenance, RecordStatus, ReferenceEntry, ReferenceTables};
pub use identity::{EntityKind, KindParseError, ReferenceKind};
pub use issue::{IssueKind, IssueList, Severity, ValidationIssue};
pub use loader::{load_corpus, Corpus, CorpusError};
pub use overrides::{CorrectionRecord, CurationSet, OverrideRecord, OverrideStore};
pub use project::{Project, ProjectError};
