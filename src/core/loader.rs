//! Template corpus loading
//!
//! Enumerates template files per entity type and the mandatory reference
//! tables. Nothing is parsed here; extraction happens in [`crate::rules`].

use miette::Diagnostic;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::core::config::Config;
use crate::core::identity::{EntityKind, ReferenceKind};
use crate::core::issue::{IssueKind, ValidationIssue};

/// Template file extension
const TEMPLATE_EXT: &str = "xml";

/// The files making up one build's template corpus
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    /// Template files per active type, sorted by path
    pub templates: BTreeMap<EntityKind, Vec<PathBuf>>,
    /// Reference table files (all present)
    pub references: BTreeMap<ReferenceKind, PathBuf>,
    /// Types skipped because the configuration marks them inactive
    pub inactive: Vec<EntityKind>,
    /// Warnings raised while enumerating (missing type directories)
    pub issues: Vec<ValidationIssue>,
}

impl Corpus {
    /// Every file in the corpus, references first
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.references
            .values()
            .chain(self.templates.values().flatten())
    }

    pub fn template_count(&self) -> usize {
        self.templates.values().map(Vec::len).sum()
    }
}

/// Enumerate the template corpus under `templates_root`
pub fn load_corpus(templates_root: &Path, config: &Config) -> Result<Corpus, CorpusError> {
    if !templates_root.is_dir() {
        return Err(CorpusError::RootMissing(templates_root.to_path_buf()));
    }

    let mut corpus = Corpus::default();

    for kind in ReferenceKind::all() {
        let path = templates_root.join(config.reference_file(*kind));
        if !path.is_file() {
            return Err(CorpusError::MissingReference { kind: *kind, path });
        }
        corpus.references.insert(*kind, path);
    }

    for (kind, type_config) in &config.entity_types {
        if !type_config.active {
            tracing::info!(entity = %kind, "entity type inactive, skipping templates");
            corpus.inactive.push(*kind);
            continue;
        }

        let dir = templates_root.join(&type_config.directory);
        if !dir.is_dir() {
            corpus.issues.push(
                ValidationIssue::warning(
                    IssueKind::MissingDirectory,
                    format!("template directory {} not found; no {} templates", dir.display(), kind),
                )
                .for_entity(*kind)
                .in_file(dir),
            );
            corpus.templates.insert(*kind, Vec::new());
            continue;
        }

        let files = list_templates(&dir)?;
        tracing::debug!(entity = %kind, files = files.len(), "templates found");
        corpus.templates.insert(*kind, files);
    }

    Ok(corpus)
}

/// Recursively list template files, sorted for deterministic file order
fn list_templates(dir: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| CorpusError::Walk {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path
            .extension()
            .map_or(false, |e| e.eq_ignore_ascii_case(TEMPLATE_EXT))
        {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Errors that prevent enumerating the corpus at all
#[derive(Debug, Error, Diagnostic)]
pub enum CorpusError {
    #[error("template root {0:?} does not exist")]
    #[diagnostic(code(lootdb::corpus::root_missing), help("run 'lootdb init' or set templates_dir"))]
    RootMissing(PathBuf),

    #[error("required {kind} reference table missing at {path:?}")]
    #[diagnostic(
        code(lootdb::corpus::missing_reference),
        help("reference tables are mandatory; restore the file or point `references` at it")
    )]
    MissingReference { kind: ReferenceKind, path: PathBuf },

    #[error("failed to walk {path:?}: {message}")]
    #[diagnostic(code(lootdb::corpus::walk))]
    Walk { path: PathBuf, message: String },
}
