//! Rule extraction
//!
//! Each template rule is classified exactly once into a [`RuleOutcome`]:
//! a skeleton still carrying its generated "<Type> ID: <n>" label, or a
//! discovered entry whose label is the real name and whose id comes from the
//! rule's condition payload. Files are extracted independently (and in
//! parallel); [`reduce`] folds the per-file results in file order.

use rayon::prelude::*;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::identity::{EntityKind, ReferenceKind};
use crate::core::issue::{IssueKind, ValidationIssue};
use crate::rules::diagnostics::{RuleParseError, RuleSource};
use crate::rules::xml::{parse_document, Element};

/// Rule label field
const LABEL_FIELD: &str = "nameOverride";

/// Classification of one entity rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Generated placeholder: the id is known, the entity is not
    Skeleton { id: u32 },
    /// Filled rule: the label is the discovered name
    Discovered { id: u32, name: String },
}

impl RuleOutcome {
    pub fn id(&self) -> u32 {
        match self {
            RuleOutcome::Skeleton { id } | RuleOutcome::Discovered { id, .. } => *id,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            RuleOutcome::Skeleton { .. } => None,
            RuleOutcome::Discovered { name, .. } => Some(name),
        }
    }
}

/// Id encoded in a placeholder label for `kind`, if the label is one
///
/// The match is strict: the whole label must be `"<Type> ID: <digits>"`.
pub fn placeholder_id(kind: EntityKind, label: &str) -> Option<u32> {
    let digits = label
        .strip_prefix(kind.label())?
        .strip_prefix(" ID: ")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Whether a label looks like a placeholder of any entity type
pub fn looks_like_placeholder(label: &str) -> bool {
    EntityKind::all()
        .iter()
        .any(|kind| placeholder_id(*kind, label.trim()).is_some())
}

/// Result of extracting one entity template file
#[derive(Debug)]
pub struct FileExtraction {
    pub path: PathBuf,
    /// (rule index, outcome) in file order
    pub outcomes: Vec<(usize, RuleOutcome)>,
    pub warnings: Vec<ValidationIssue>,
    pub errors: Vec<RuleParseError>,
}

impl FileExtraction {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            outcomes: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// True when the file as a whole could not be used
    pub fn failed(&self) -> bool {
        self.errors.iter().any(|e| e.rule_index().is_none())
    }
}

/// Read and extract one entity template file
pub fn extract_entity_file(kind: EntityKind, path: &Path) -> FileExtraction {
    match std::fs::read_to_string(path) {
        Ok(content) => extract_entity_source(kind, path, &content),
        Err(e) => {
            let mut extraction = FileExtraction::new(path);
            extraction.errors.push(RuleParseError::file(
                format!("failed to read file: {}", e),
                &RuleSource::new(&path.display().to_string(), ""),
                0,
            ));
            extraction
        }
    }
}

/// Extract entity rules from already-loaded file content
pub fn extract_entity_source(kind: EntityKind, path: &Path, content: &str) -> FileExtraction {
    let mut extraction = FileExtraction::new(path);
    let filename = path.display().to_string();
    let source = RuleSource::new(&filename, content);

    let rules = match rule_elements(&source, content) {
        Ok(rules) => rules,
        Err(e) => {
            extraction.errors.push(e);
            return extraction;
        }
    };

    for (index, rule) in rules.iter().enumerate() {
        match classify_rule(kind, rule) {
            Ok((outcome, payload_mismatch)) => {
                if let Some(payload_id) = payload_mismatch {
                    extraction.warnings.push(
                        ValidationIssue::warning(
                            IssueKind::LabelPayloadMismatch,
                            format!(
                                "placeholder label names id {} but the condition payload names {}; using the label",
                                outcome.id(),
                                payload_id
                            ),
                        )
                        .for_entity(kind)
                        .with_ids([outcome.id(), payload_id])
                        .in_file(path)
                        .at_rule(index),
                    );
                }
                extraction.outcomes.push((index, outcome));
            }
            Err(message) => extraction.errors.push(RuleParseError::rule(
                message,
                &source,
                rule.offset,
                index,
            )),
        }
    }

    extraction
}

/// Parse a document and return its `<Rule>` elements
fn rule_elements(source: &RuleSource<'_>, content: &str) -> Result<Vec<Element>, RuleParseError> {
    let root = parse_document(content).map_err(|e| {
        RuleParseError::file(
            format!("not a well-formed rule file: {}", e.message),
            source,
            e.offset,
        )
    })?;
    let rules = root.child("rules").ok_or_else(|| {
        RuleParseError::file(
            format!("missing <rules> element under <{}>", root.name),
            source,
            root.offset,
        )
    })?;
    Ok(rules.children_named("Rule").cloned().collect())
}

/// Classify one rule; also returns a payload id that disagrees with a skeleton label
fn classify_rule(kind: EntityKind, rule: &Element) -> Result<(RuleOutcome, Option<u32>), String> {
    let label = rule.child_text(LABEL_FIELD);
    let payload = payload_id(kind, rule);

    match label {
        Some(label) => {
            if let Some(id) = placeholder_id(kind, label) {
                let mismatch = match payload {
                    Ok(Some(payload_id)) if payload_id != id => Some(payload_id),
                    _ => None,
                };
                return Ok((RuleOutcome::Skeleton { id }, mismatch));
            }
            match payload? {
                Some(id) => Ok((
                    RuleOutcome::Discovered {
                        id,
                        name: label.to_string(),
                    },
                    None,
                )),
                None => Err(format!(
                    "filled rule '{}' has no {} condition to take its id from",
                    label,
                    condition_name(kind)
                )),
            }
        }
        None => match payload? {
            Some(id) => Ok((RuleOutcome::Skeleton { id }, None)),
            None => Err(format!(
                "rule has neither a <{}> label nor a {} condition",
                LABEL_FIELD,
                condition_name(kind)
            )),
        },
    }
}

fn condition_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Affix => "AffixCondition",
        EntityKind::Unique | EntityKind::Set => "UniqueModifiersCondition",
    }
}

/// Conditions of a rule whose `i:type` satisfies `matches`
fn conditions<'a>(rule: &'a Element, matches: impl Fn(&str) -> bool + 'a) -> Vec<&'a Element> {
    rule.child("conditions")
        .map(|c| {
            c.children_named("Condition")
                .filter(|cond| cond.attr("type").map_or(false, |t| matches(t)))
                .collect()
        })
        .unwrap_or_default()
}

/// Id named by the rule's structured condition payload
///
/// `Ok(None)` means the rule has no condition of the right type; `Err`
/// means it has one but it is malformed.
fn payload_id(kind: EntityKind, rule: &Element) -> Result<Option<u32>, String> {
    match kind {
        EntityKind::Affix => {
            let Some(condition) = conditions(rule, |t| t == "AffixCondition").into_iter().next()
            else {
                return Ok(None);
            };
            let Some(list) = condition.child("affixes") else {
                return Err("AffixCondition has no <affixes> list".to_string());
            };
            let ids = list
                .children_named("int")
                .map(|el| parse_code(el.text()))
                .collect::<Result<Vec<_>, _>>()?;
            match ids.as_slice() {
                [id] => Ok(Some(*id)),
                other => Err(format!(
                    "expected exactly one affix id in AffixCondition, found {}",
                    other.len()
                )),
            }
        }
        EntityKind::Unique | EntityKind::Set => {
            let Some(condition) = conditions(rule, |t| t.contains("Unique")).into_iter().next()
            else {
                return Ok(None);
            };
            let mut ids = condition
                .descendants()
                .into_iter()
                .filter(|el| el.is("UniqueId"))
                .map(|el| parse_code(el.text()))
                .collect::<Result<Vec<_>, _>>()?;
            ids.dedup();
            match ids.as_slice() {
                [id] => Ok(Some(*id)),
                [] => Err("unique condition has no <UniqueId>".to_string()),
                _ => Err("unique condition names more than one UniqueId".to_string()),
            }
        }
    }
}

fn parse_code(text: &str) -> Result<u32, String> {
    crate::core::identity::parse_id(text).ok_or_else(|| format!("value '{}' is not an integer id", text))
}

/// Extract a set of files on a bounded worker pool, preserving input order
///
/// `threads == 0` uses rayon's default sizing. If the pool cannot be built
/// extraction runs on the calling thread.
pub fn extract_files(kind: EntityKind, paths: &[PathBuf], threads: usize) -> Vec<FileExtraction> {
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(|| {
            paths
                .par_iter()
                .map(|path| extract_entity_file(kind, path))
                .collect()
        }),
        Err(e) => {
            tracing::warn!(error = %e, "worker pool unavailable, extracting sequentially");
            paths
                .iter()
                .map(|path| extract_entity_file(kind, path))
                .collect()
        }
    }
}

/// The best-known state of one id after reduction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Discovered name; `None` while only skeletons were seen
    pub name: Option<String>,
    pub source: PathBuf,
    pub rule_index: usize,
}

/// Fold per-file extractions (in the given order) into one id→candidate map
///
/// A discovered name upgrades a skeleton; a second, different discovered name
/// for an id raises a warning and the first one is kept.
pub fn reduce(
    kind: EntityKind,
    files: Vec<FileExtraction>,
) -> (BTreeMap<u32, Candidate>, Vec<ValidationIssue>) {
    let mut candidates: BTreeMap<u32, Candidate> = BTreeMap::new();
    let mut issues = Vec::new();

    for file in files {
        issues.extend(file.warnings);
        for error in &file.errors {
            issues.push(parse_issue(Some(kind), &file.path, error));
        }

        for (index, outcome) in file.outcomes {
            let id = outcome.id();
            let name = outcome.name().map(str::to_string);
            match candidates.entry(id) {
                Entry::Vacant(slot) => {
                    slot.insert(Candidate {
                        name,
                        source: file.path.clone(),
                        rule_index: index,
                    });
                }
                Entry::Occupied(mut slot) => {
                    let Some(second) = name else {
                        continue;
                    };
                    let existing = slot.get_mut();
                    if existing.name.is_none() {
                        existing.name = Some(second);
                        existing.source = file.path.clone();
                        existing.rule_index = index;
                    } else if let Some(first) = existing.name.as_deref() {
                        if first == second {
                            continue;
                        }
                        let place = if existing.source == file.path {
                            "in the same file".to_string()
                        } else {
                            format!("(first seen in {})", existing.source.display())
                        };
                        issues.push(
                            ValidationIssue::warning(
                                IssueKind::ConflictingRule,
                                format!(
                                    "id {} discovered as both '{}' and '{}' {}; keeping '{}'",
                                    id, first, second, place, first
                                ),
                            )
                            .for_entity(kind)
                            .with_ids([id])
                            .in_file(&file.path)
                            .at_rule(index),
                        );
                    }
                }
            }
        }
    }

    (candidates, issues)
}

/// Build-issue form of a parse error
pub fn parse_issue(kind: Option<EntityKind>, path: &Path, error: &RuleParseError) -> ValidationIssue {
    let mut issue = match error.rule_index() {
        Some(index) => ValidationIssue::error(
            IssueKind::ParseError,
            format!("line {}: {}; rule skipped", error.line(), error.message()),
        )
        .at_rule(index),
        None => ValidationIssue::error(
            IssueKind::ParseError,
            format!("line {}: {}; file skipped", error.line(), error.message()),
        ),
    }
    .in_file(path);
    issue.entity = kind;
    issue
}

/// Result of extracting one reference table
#[derive(Debug)]
pub struct ReferenceExtraction {
    pub entries: BTreeMap<u32, String>,
    pub issues: Vec<ValidationIssue>,
    pub errors: Vec<RuleParseError>,
}

/// Read a reference table: label and code are sibling fields of each rule
pub fn extract_reference_file(kind: ReferenceKind, path: &Path) -> ReferenceExtraction {
    let mut extraction = ReferenceExtraction {
        entries: BTreeMap::new(),
        issues: Vec::new(),
        errors: Vec::new(),
    };
    let filename = path.display().to_string();

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            extraction.errors.push(RuleParseError::file(
                format!("failed to read file: {}", e),
                &RuleSource::new(&filename, ""),
                0,
            ));
            extraction.issues = extraction
                .errors
                .iter()
                .map(|err| parse_issue(None, path, err))
                .collect();
            return extraction;
        }
    };

    let source = RuleSource::new(&filename, &content);
    match rule_elements(&source, &content) {
        Ok(rules) => {
            for (index, rule) in rules.iter().enumerate() {
                let label = rule.child_text(LABEL_FIELD);
                let code = rule.child_text(kind.code_field()).map(parse_code);
                match (label, code) {
                    (Some(label), Some(Ok(code))) => match extraction.entries.entry(code) {
                        Entry::Vacant(slot) => {
                            slot.insert(label.to_string());
                        }
                        Entry::Occupied(slot) if slot.get() != label => {
                            extraction.issues.push(
                                ValidationIssue::warning(
                                    IssueKind::ConflictingRule,
                                    format!(
                                        "{} code {} labelled both '{}' and '{}'; keeping '{}'",
                                        kind,
                                        code,
                                        slot.get(),
                                        label,
                                        slot.get()
                                    ),
                                )
                                .with_ids([code])
                                .in_file(path)
                                .at_rule(index),
                            );
                        }
                        Entry::Occupied(_) => {}
                    },
                    (_, Some(Err(message))) => extraction.errors.push(RuleParseError::rule(
                        message,
                        &source,
                        rule.offset,
                        index,
                    )),
                    (None, _) => extraction.errors.push(RuleParseError::rule(
                        format!("reference rule has no <{}> label", LABEL_FIELD),
                        &source,
                        rule.offset,
                        index,
                    )),
                    (Some(_), None) => extraction.errors.push(RuleParseError::rule(
                        format!("reference rule has no <{}> code", kind.code_field()),
                        &source,
                        rule.offset,
                        index,
                    )),
                }
            }
        }
        Err(e) => extraction.errors.push(e),
    }

    let parse_issues: Vec<_> = extraction
        .errors
        .iter()
        .map(|err| parse_issue(None, path, err))
        .collect();
    extraction.issues.extend(parse_issues);
    extraction
}
