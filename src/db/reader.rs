//! Read side of the database for downstream consumers
//!
//! Consumers open the output directory and never touch templates or
//! override files.

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::entity::{EntityRecord, ReferenceEntry};
use crate::core::identity::{EntityKind, ReferenceKind};
use crate::db::index::{IdentifierIndex, IdsByKind, TagIndex, INDEX_DIR, TAGS_FILE};
use crate::db::snapshot::{DatabaseSnapshot, SnapshotMetadata, FORMAT_VERSION, SNAPSHOT_FILE};

/// A loaded snapshot plus its lookup indexes
#[derive(Debug, Clone)]
pub struct Database {
    snapshot: DatabaseSnapshot,
    ids: IdentifierIndex,
    tags: Option<TagIndex>,
}

impl Database {
    /// Open the database written to `dir`
    pub fn open(dir: &Path) -> Result<Self, DatabaseError> {
        let path = dir.join(SNAPSHOT_FILE);
        if !path.is_file() {
            return Err(DatabaseError::NotFound(path));
        }
        let content = std::fs::read_to_string(&path).map_err(|e| DatabaseError::Read {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let meta = DatabaseSnapshot::read_metadata(&content).map_err(|e| DatabaseError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        if meta.format_version != FORMAT_VERSION {
            return Err(DatabaseError::VersionMismatch {
                found: meta.format_version,
                expected: FORMAT_VERSION,
            });
        }

        let snapshot = DatabaseSnapshot::from_yaml(&content).map_err(|e| DatabaseError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let ids = IdentifierIndex::from_snapshot(&snapshot);
        let tags = read_tags(
            &dir.join(INDEX_DIR).join(TAGS_FILE),
            &snapshot.metadata.sources_digest,
        );

        Ok(Self {
            snapshot,
            ids,
            tags,
        })
    }

    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.snapshot.metadata
    }

    pub fn snapshot(&self) -> &DatabaseSnapshot {
        &self.snapshot
    }

    pub fn record(&self, kind: EntityKind, id: u32) -> Option<&EntityRecord> {
        self.ids.get(kind, id)
    }

    /// Discovered name; `None` for unknown or not-yet-discovered ids
    pub fn name(&self, kind: EntityKind, id: u32) -> Option<&str> {
        self.record(kind, id).and_then(|r| r.name.as_deref())
    }

    /// Ids carrying a tag (or a declared `a+b` pair); `None` without a tag index
    pub fn tagged(&self, tag: &str) -> Option<&IdsByKind> {
        self.tags.as_ref().and_then(|t| t.tagged(tag))
    }

    pub fn has_tag_index(&self) -> bool {
        self.tags.is_some()
    }

    /// Ids seen in templates but not yet discovered
    pub fn missing(&self, kind: EntityKind) -> Vec<u32> {
        self.snapshot
            .records(kind)
            .iter()
            .filter(|r| r.is_missing())
            .map(|r| r.id)
            .collect()
    }

    pub fn reference(&self, kind: ReferenceKind, id: u32) -> Option<&ReferenceEntry> {
        self.snapshot
            .references
            .table(kind)
            .iter()
            .find(|e| e.id == id)
    }
}

/// The tag index at `path`, only if it was derived from this snapshot
fn read_tags(path: &Path, sources_digest: &str) -> Option<TagIndex> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<TagIndex>(&content) {
        Ok(tags) if tags.sources_digest == sources_digest => Some(tags),
        Ok(tags) => {
            tracing::warn!(
                path = %path.display(),
                index = %tags.sources_digest,
                snapshot = %sources_digest,
                "tag index belongs to another build; ignored"
            );
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "tag index unreadable");
            None
        }
    }
}

/// Errors opening a built database
#[derive(Debug, Error, Diagnostic)]
pub enum DatabaseError {
    #[error("no database snapshot at {0:?}")]
    #[diagnostic(code(lootdb::db::not_found), help("run 'lootdb build' first"))]
    NotFound(PathBuf),

    #[error("failed to read {path:?}: {message}")]
    #[diagnostic(code(lootdb::db::read))]
    Read { path: PathBuf, message: String },

    #[error("invalid snapshot {path:?}: {message}")]
    #[diagnostic(code(lootdb::db::parse), help("rebuild with 'lootdb build --force'"))]
    Parse { path: PathBuf, message: String },

    #[error("snapshot format version {found} does not match reader version {expected}")]
    #[diagnostic(
        code(lootdb::db::version_mismatch),
        help("re-derive the database with 'lootdb build --force'")
    )]
    VersionMismatch { found: u32, expected: u32 },
}
