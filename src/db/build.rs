//! Build orchestrator
//!
//! Runs loader → extractor → merge → validator → snapshot → indexes and is
//! the only part of the pipeline that touches the output directory.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

use crate::core::config::{Config, EntityTypeConfig, PatternRule};
use crate::core::entity::ReferenceTables;
use crate::core::identity::EntityKind;
use crate::core::issue::{IssueKind, IssueList, ValidationIssue};
use crate::core::loader::{load_corpus, Corpus, CorpusError};
use crate::core::overrides::OverrideStore;
use crate::core::project::Project;
use crate::db::index::{self, build_indexes, INDEX_DIR};
use crate::db::log::{BuildLog, BuildSummary, TypeRow, LOG_FILE, SUMMARY_FILE};
use crate::db::merge::{self, EntityMap, MergeStats};
use crate::db::snapshot::{self, AssemblyInfo, DatabaseSnapshot, FORMAT_VERSION, SNAPSHOT_FILE};
use crate::db::validate::Validator;
use crate::rules::{self, RuleParseError};

/// Orchestrator state; Done, Skipped and Failed are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Building,
    Done,
    Skipped,
    Failed,
}

impl BuildState {
    pub fn can_transition(self, to: BuildState) -> bool {
        matches!(
            (self, to),
            (BuildState::Idle, BuildState::Building)
                | (BuildState::Idle, BuildState::Skipped)
                | (BuildState::Building, BuildState::Done)
                | (BuildState::Building, BuildState::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BuildState::Done | BuildState::Skipped | BuildState::Failed)
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildState::Idle => write!(f, "idle"),
            BuildState::Building => write!(f, "building"),
            BuildState::Done => write!(f, "done"),
            BuildState::Skipped => write!(f, "skipped"),
            BuildState::Failed => write!(f, "failed"),
        }
    }
}

/// Resolved input and output locations for one build
#[derive(Debug, Clone)]
pub struct BuildPaths {
    /// Base for the relative paths hashed into the sources digest
    pub root: PathBuf,
    pub templates: PathBuf,
    pub overrides: PathBuf,
    pub output: PathBuf,
    /// Project config file, counted as a build input when present
    pub config_file: Option<PathBuf>,
}

impl BuildPaths {
    pub fn for_project(project: &Project, config: &Config) -> Self {
        Self {
            root: project.root().to_path_buf(),
            templates: project.resolve(&config.templates_dir),
            overrides: project.resolve(&config.overrides_dir),
            output: project.resolve(&config.output_dir),
            config_file: Some(project.config_path()),
        }
    }

    pub fn snapshot_file(&self) -> PathBuf {
        self.output.join(SNAPSHOT_FILE)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildRequest {
    /// Rebuild even if the snapshot is up to date
    pub force: bool,
}

/// Why a build was skipped
#[derive(Debug, Clone)]
pub struct SkipReport {
    pub snapshot: PathBuf,
    pub snapshot_timestamp: DateTime<Utc>,
    pub newest_source: DateTime<Utc>,
}

/// Result of a completed build
#[derive(Debug)]
pub struct BuildReport {
    pub snapshot: DatabaseSnapshot,
    pub summary: BuildSummary,
    pub issues: IssueList,
    pub output: PathBuf,
}

#[derive(Debug)]
pub enum BuildOutcome {
    Done(Box<BuildReport>),
    Skipped(SkipReport),
    Failed(BuildError),
}

impl BuildOutcome {
    pub fn state(&self) -> BuildState {
        match self {
            BuildOutcome::Done(_) => BuildState::Done,
            BuildOutcome::Skipped(_) => BuildState::Skipped,
            BuildOutcome::Failed(_) => BuildState::Failed,
        }
    }
}

/// Conditions that prevent writing any valid snapshot
#[derive(Debug, Error, Diagnostic)]
pub enum BuildError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Corpus(#[from] CorpusError),

    #[error("output directory {path:?} is not writable: {message}")]
    #[diagnostic(
        code(lootdb::build::output_unwritable),
        help("check permissions or set output_dir / LOOTDB_OUTPUT_DIR")
    )]
    OutputUnwritable { path: PathBuf, message: String },

    #[error("failed to serialize snapshot: {0}")]
    #[diagnostic(code(lootdb::build::serialize))]
    Serialize(String),

    #[error("invalid build state transition: {from} -> {to}")]
    #[diagnostic(code(lootdb::build::state))]
    InvalidTransition { from: BuildState, to: BuildState },
}

/// Resolved settings that change what a build writes
///
/// Covers the global config file and `LOOTDB_*` overrides, which are not
/// project files and so never show up in the input list.
#[derive(Serialize)]
struct SettingsFingerprint<'a> {
    content_version: &'a str,
    entity_types: &'a BTreeMap<EntityKind, EntityTypeConfig>,
    placeholder_markers: &'a [String],
    tag_rules: &'a [PatternRule],
    mechanic_rules: &'a [PatternRule],
    tag_pairs: &'a [(String, String)],
    summary_issue_limit: usize,
}

impl<'a> SettingsFingerprint<'a> {
    fn of(config: &'a Config) -> Self {
        Self {
            content_version: &config.content_version,
            entity_types: &config.entity_types,
            placeholder_markers: &config.placeholder_markers,
            tag_rules: &config.tag_rules,
            mechanic_rules: &config.mechanic_rules,
            tag_pairs: &config.tag_pairs,
            summary_issue_limit: config.summary_issue_limit,
        }
    }
}

/// Every file a build reads
#[derive(Debug, Clone)]
pub struct BuildInputs {
    pub corpus: Corpus,
    pub curation_files: Vec<PathBuf>,
    pub config_file: Option<PathBuf>,
    sources_digest: String,
}

impl BuildInputs {
    /// Enumerate inputs; fails when a mandatory reference table is absent
    pub fn collect(config: &Config, paths: &BuildPaths) -> Result<Self, CorpusError> {
        let corpus = load_corpus(&paths.templates, config)?;
        let active: Vec<EntityKind> = corpus.templates.keys().copied().collect();
        let curation_files = OverrideStore::source_files(&paths.overrides, &active);
        let config_file = paths.config_file.clone().filter(|p| p.is_file());
        let mut inputs = Self {
            corpus,
            curation_files,
            config_file,
            sources_digest: String::new(),
        };
        inputs.sources_digest = inputs.compute_digest(&paths.root, config);
        Ok(inputs)
    }

    /// All input paths, sorted
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .corpus
            .files()
            .cloned()
            .chain(self.curation_files.iter().cloned())
            .chain(self.config_file.iter().cloned())
            .collect();
        files.sort();
        files.dedup();
        files
    }

    /// Newest modification time across inputs (epoch when none can be read)
    pub fn newest_mtime(&self) -> DateTime<Utc> {
        self.files()
            .iter()
            .filter_map(|p| std::fs::metadata(p).and_then(|m| m.modified()).ok())
            .max()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|| DateTime::<Utc>::from(SystemTime::UNIX_EPOCH))
    }

    /// SHA-256 over the input paths relative to the project root, their
    /// contents, and the resolved settings
    pub fn digest(&self) -> &str {
        &self.sources_digest
    }

    fn compute_digest(&self, root: &Path, config: &Config) -> String {
        let mut relative: Vec<(String, &PathBuf)> = Vec::new();
        let files = self.files();
        for path in &files {
            let name = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            relative.push((name, path));
        }
        relative.sort();

        let mut hasher = Sha256::new();
        for (name, path) in &relative {
            hasher.update(name.as_bytes());
            hasher.update(b"\n");
            match std::fs::read(path) {
                Ok(bytes) => hasher.update(Sha256::digest(&bytes)),
                Err(e) => tracing::debug!(path = %path.display(), error = %e, "input unreadable for digest"),
            }
        }
        match serde_json::to_vec(&SettingsFingerprint::of(config)) {
            Ok(settings) => hasher.update(&settings),
            Err(e) => tracing::warn!(error = %e, "settings not hashed into sources digest"),
        }
        format!("{:x}", hasher.finalize())
    }
}

/// An assembled database that has not been written anywhere
#[derive(Debug)]
pub struct Assembly {
    pub snapshot: DatabaseSnapshot,
    pub rows: BTreeMap<EntityKind, TypeRow>,
    /// Parse errors with source spans, for rendering
    pub diagnostics: Vec<RuleParseError>,
}

/// Run extraction, merge, validation and snapshot assembly in memory
pub fn assemble_database(
    config: &Config,
    paths: &BuildPaths,
    inputs: &BuildInputs,
    log: &mut BuildLog,
) -> Assembly {
    let corpus = &inputs.corpus;
    let mut diagnostics = Vec::new();
    let mut rows: BTreeMap<EntityKind, TypeRow> = BTreeMap::new();

    log.issues_from(corpus.issues.iter().cloned());
    for kind in &corpus.inactive {
        log.info(format!("{} inactive by configuration; skipped", kind.plural()));
    }

    let active: Vec<EntityKind> = corpus.templates.keys().copied().collect();
    let (store, curation_issues) = OverrideStore::load(&paths.overrides, &active);
    log.issues_from(curation_issues);

    let mut references = ReferenceTables::default();
    for (kind, path) in &corpus.references {
        let table = rules::extract_reference_file(*kind, path);
        log.info(format!("{}: {} reference entries", kind, table.entries.len()));
        log.issues_from(table.issues);
        diagnostics.extend(table.errors);
        references.set_table(*kind, &table.entries);
    }

    let validator = Validator::new(&config.placeholder_markers);
    let mut maps: BTreeMap<EntityKind, EntityMap> = BTreeMap::new();
    let mut stats = MergeStats::default();

    for (kind, files) in &corpus.templates {
        let kind = *kind;
        let mut extractions = rules::extract_files(kind, files, config.threads);

        let mut row = TypeRow {
            files: extractions.len(),
            files_failed: extractions.iter().filter(|e| e.failed()).count(),
            ..TypeRow::default()
        };
        for extraction in &mut extractions {
            for error in extraction.errors.drain(..) {
                log.issue(rules::parse_issue(Some(kind), &extraction.path, &error));
                diagnostics.push(error);
            }
        }

        let (candidates, reduce_issues) = rules::reduce(kind, extractions);
        log.issues_from(reduce_issues);
        let template_ids: BTreeSet<u32> = candidates.keys().copied().collect();

        let curation = store.get(kind).cloned().unwrap_or_default();
        let merged = merge::merge(kind, &candidates, &curation);
        log.issues_from(merged.issues);
        log.issues_from(validator.validate(kind, &merged.records, &template_ids, Some(&curation)));

        row.overrides = merged.stats.overrides_applied;
        row.corrections = merged.stats.corrections_applied;
        stats.overrides_applied += merged.stats.overrides_applied;
        stats.corrections_applied += merged.stats.corrections_applied;
        log.info(format!(
            "{}: {} files, {} entries ({} from templates)",
            kind.plural(),
            row.files,
            merged.records.len(),
            template_ids.len()
        ));

        rows.insert(kind, row);
        maps.insert(kind, merged.records);
    }

    let snapshot = snapshot::assemble(
        AssemblyInfo {
            content_version: config.content_version.clone(),
            source_timestamp: inputs.newest_mtime(),
            sources_digest: inputs.digest().to_string(),
            stats,
            curation_versions: store.declared_versions(),
            inactive_types: corpus.inactive.clone(),
        },
        references,
        &maps,
    );

    Assembly {
        snapshot,
        rows,
        diagnostics,
    }
}

/// Write `contents` to `dir/name` through a temporary file and atomic rename
pub fn write_atomic(dir: &Path, name: &str, contents: &str) -> std::io::Result<PathBuf> {
    let target = dir.join(name);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(&target).map_err(|e| e.error)?;
    Ok(target)
}

/// Drives one build invocation through its states
#[derive(Debug)]
pub struct Orchestrator {
    config: Config,
    paths: BuildPaths,
    state: BuildState,
}

impl Orchestrator {
    pub fn new(config: Config, paths: BuildPaths) -> Self {
        Self {
            config,
            paths,
            state: BuildState::Idle,
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn paths(&self) -> &BuildPaths {
        &self.paths
    }

    fn transition(&mut self, to: BuildState) -> Result<(), BuildError> {
        if !self.state.can_transition(to) {
            return Err(BuildError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(from = %self.state, to = %to, "build state");
        self.state = to;
        Ok(())
    }

    fn fail(&mut self, error: BuildError) -> BuildOutcome {
        if self.state == BuildState::Idle {
            self.state = BuildState::Building;
        }
        if let Err(invalid) = self.transition(BuildState::Failed) {
            return BuildOutcome::Failed(invalid);
        }
        tracing::error!("build failed: {}", error);
        BuildOutcome::Failed(error)
    }

    /// Run one build; the orchestrator is spent afterwards
    pub fn run(&mut self, request: BuildRequest) -> BuildOutcome {
        if self.state != BuildState::Idle {
            return BuildOutcome::Failed(BuildError::InvalidTransition {
                from: self.state,
                to: BuildState::Building,
            });
        }
        let started = Utc::now();

        let inputs = match BuildInputs::collect(&self.config, &self.paths) {
            Ok(inputs) => inputs,
            Err(e) => return self.fail(e.into()),
        };

        if !request.force {
            if let Some(skip) = self.up_to_date(&inputs) {
                tracing::info!(snapshot = %skip.snapshot.display(), "database up to date");
                return match self.transition(BuildState::Skipped) {
                    Ok(()) => BuildOutcome::Skipped(skip),
                    Err(e) => BuildOutcome::Failed(e),
                };
            }
        }

        if let Err(e) = self.transition(BuildState::Building) {
            return BuildOutcome::Failed(e);
        }

        match self.build(&inputs, started) {
            Ok(report) => match self.transition(BuildState::Done) {
                Ok(()) => BuildOutcome::Done(Box::new(report)),
                Err(e) => BuildOutcome::Failed(e),
            },
            Err(e) => self.fail(e),
        }
    }

    /// The existing snapshot, if it is current for these inputs
    fn up_to_date(&self, inputs: &BuildInputs) -> Option<SkipReport> {
        let path = self.paths.snapshot_file();
        let content = std::fs::read_to_string(&path).ok()?;
        let meta = match DatabaseSnapshot::read_metadata(&content) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::info!(error = %e, "existing snapshot unreadable, rebuilding");
                return None;
            }
        };

        let newest = inputs.newest_mtime();
        let current = meta.format_version == FORMAT_VERSION
            && meta.sources_digest == inputs.digest()
            && newest <= meta.source_timestamp;
        current.then(|| SkipReport {
            snapshot: path,
            snapshot_timestamp: meta.source_timestamp,
            newest_source: newest,
        })
    }

    fn prepare_output(&self) -> Result<PathBuf, BuildError> {
        let output = &self.paths.output;
        let unwritable = |e: std::io::Error| BuildError::OutputUnwritable {
            path: output.clone(),
            message: e.to_string(),
        };
        let index_dir = output.join(INDEX_DIR);
        std::fs::create_dir_all(&index_dir).map_err(unwritable)?;
        tempfile::NamedTempFile::new_in(output).map_err(unwritable)?;
        Ok(index_dir)
    }

    fn build(&mut self, inputs: &BuildInputs, started: DateTime<Utc>) -> Result<BuildReport, BuildError> {
        let mut log = BuildLog::new();
        log.info(format!(
            "building {} ({} template files)",
            self.config.content_version,
            inputs.corpus.template_count()
        ));

        let index_dir = self.prepare_output()?;
        let assembly = assemble_database(&self.config, &self.paths, inputs, &mut log);

        let yaml = assembly
            .snapshot
            .to_yaml()
            .map_err(|e| BuildError::Serialize(e.to_string()))?;
        let snapshot_path = write_atomic(&self.paths.output, SNAPSHOT_FILE, &yaml).map_err(|e| {
            BuildError::OutputUnwritable {
                path: self.paths.output.clone(),
                message: e.to_string(),
            }
        })?;
        log.info(format!(
            "snapshot written to {} ({} entries)",
            snapshot_path.display(),
            assembly.snapshot.total_records()
        ));

        self.write_indexes(&assembly.snapshot, &index_dir, &mut log);

        let summary = BuildSummary {
            started,
            finished: Utc::now(),
            metadata: assembly.snapshot.metadata.clone(),
            rows: assembly.rows,
            issue_limit: self.config.summary_issue_limit,
        };
        log.info(format!(
            "done: {} warnings, {} errors",
            log.issues().warnings(),
            log.issues().errors()
        ));

        let summary_text = summary.render(log.issues());
        if let Err(e) = write_atomic(&self.paths.output, SUMMARY_FILE, &summary_text) {
            tracing::error!(error = %e, "failed to write build summary");
        }
        if let Err(e) = write_atomic(&self.paths.output, LOG_FILE, &log.render()) {
            tracing::error!(error = %e, "failed to write build log");
        }

        Ok(BuildReport {
            snapshot: assembly.snapshot,
            summary,
            issues: log.into_issues(),
            output: self.paths.output.clone(),
        })
    }

    /// Build and write each index; a failure degrades only that index
    ///
    /// A degraded index is removed so an earlier build's file is never read
    /// alongside the new snapshot.
    fn write_indexes(&self, snapshot: &DatabaseSnapshot, index_dir: &Path, log: &mut BuildLog) {
        let (set, issues) = build_indexes(snapshot, &self.config);
        log.issues_from(issues);

        let outputs = [
            (index::IDS_FILE, Some(index::to_json(&set.ids))),
            (index::TAGS_FILE, set.tags.as_ref().ok().map(index::to_json)),
            (index::MECHANICS_FILE, set.mechanics.as_ref().ok().map(index::to_json)),
        ];

        for (name, json) in outputs {
            let Some(json) = json else {
                discard_index(index_dir, name, log);
                continue;
            };
            let written = json
                .map_err(|e| e.to_string())
                .and_then(|text| write_atomic(index_dir, name, &text).map_err(|e| e.to_string()));
            match written {
                Ok(path) => log.info(format!("index written to {}", path.display())),
                Err(message) => {
                    log.issue(ValidationIssue::error(
                        IssueKind::IndexDegraded,
                        format!("{} not written: {}", name, message),
                    ));
                    discard_index(index_dir, name, log);
                }
            }
        }
    }
}

fn discard_index(index_dir: &Path, name: &str, log: &mut BuildLog) {
    let path = index_dir.join(name);
    match std::fs::remove_file(&path) {
        Ok(()) => log.info(format!("removed stale {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log.issue(ValidationIssue::error(
            IssueKind::IndexDegraded,
            format!("stale {} could not be removed: {}", name, e),
        )),
    }
}
