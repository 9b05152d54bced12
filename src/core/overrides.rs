//! Override and correction store
//!
//! Operators maintain one override file and one correction file per entity
//! type. Overrides replace an entity's payload outright; corrections relabel
//! an entity that already has a name and record why. A malformed key or
//! record is skipped on its own, a malformed file is skipped as a whole.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::entity::Properties;
use crate::core::identity::{parse_id, EntityKind};
use crate::core::issue::{IssueKind, ValidationIssue};

/// Operator-authored replacement/addition for one id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Why a correction was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrectionReason {
    DuplicateName,
    Typo,
    Ambiguous,
    #[default]
    Other,
}

impl fmt::Display for CorrectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectionReason::DuplicateName => write!(f, "duplicate-name"),
            CorrectionReason::Typo => write!(f, "typo"),
            CorrectionReason::Ambiguous => write!(f, "ambiguous"),
            CorrectionReason::Other => write!(f, "other"),
        }
    }
}

/// Operator-authored relabel of an existing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrectionRecord {
    /// The corrected name
    pub name: String,
    /// Name the operator expects to be replacing
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub reason: CorrectionReason,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One parsed override or correction file
#[derive(Debug, Clone, PartialEq)]
pub struct CurationFile<T> {
    pub path: PathBuf,
    /// Declared content version (informational only)
    pub version: Option<String>,
    /// Declared last-modified stamp (informational only)
    pub last_modified: Option<String>,
    pub records: BTreeMap<u32, T>,
}

impl<T> CurationFile<T> {
    fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            version: None,
            last_modified: None,
            records: BTreeMap::new(),
        }
    }
}

/// Overrides and corrections for one entity type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurationSet {
    pub overrides: Option<CurationFile<OverrideRecord>>,
    pub corrections: Option<CurationFile<CorrectionRecord>>,
}

impl CurationSet {
    pub fn override_for(&self, id: u32) -> Option<&OverrideRecord> {
        self.overrides.as_ref().and_then(|f| f.records.get(&id))
    }

    pub fn override_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.overrides.iter().flat_map(|f| f.records.keys().copied())
    }

    pub fn correction_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.corrections.iter().flat_map(|f| f.records.keys().copied())
    }
}

/// All curation data for a build, keyed by entity type
#[derive(Debug, Clone, Default)]
pub struct OverrideStore {
    sets: BTreeMap<EntityKind, CurationSet>,
}

impl OverrideStore {
    /// Load override and correction files for the given types
    ///
    /// Absent files mean zero records. Returns the store plus every format
    /// problem encountered.
    pub fn load(root: &Path, kinds: &[EntityKind]) -> (Self, Vec<ValidationIssue>) {
        let mut store = Self::default();
        let mut issues = Vec::new();

        for kind in kinds {
            let set = CurationSet {
                overrides: load_file(&root.join(kind.overrides_file()), "overrides", *kind, &mut issues),
                corrections: load_file(
                    &root.join(kind.corrections_file()),
                    "corrections",
                    *kind,
                    &mut issues,
                ),
            };
            store.sets.insert(*kind, set);
        }

        (store, issues)
    }

    /// Existing curation files under `root`, whether or not they parse
    pub fn source_files(root: &Path, kinds: &[EntityKind]) -> Vec<PathBuf> {
        kinds
            .iter()
            .flat_map(|kind| [kind.overrides_file(), kind.corrections_file()])
            .map(|name| root.join(name))
            .filter(|path| path.is_file())
            .collect()
    }

    pub fn get(&self, kind: EntityKind) -> Option<&CurationSet> {
        self.sets.get(&kind)
    }

    /// Declared versions per loaded file, for the snapshot header
    pub fn declared_versions(&self) -> BTreeMap<String, String> {
        let mut versions = BTreeMap::new();
        for (kind, set) in &self.sets {
            if let Some(v) = set.overrides.as_ref().and_then(|f| f.version.clone()) {
                versions.insert(kind.overrides_file(), v);
            }
            if let Some(v) = set.corrections.as_ref().and_then(|f| f.version.clone()) {
                versions.insert(kind.corrections_file(), v);
            }
        }
        versions
    }
}

/// Load one curation file; `section` names the map holding the records
fn load_file<T: DeserializeOwned>(
    path: &Path,
    section: &str,
    kind: EntityKind,
    issues: &mut Vec<ValidationIssue>,
) -> Option<CurationFile<T>> {
    if !path.is_file() {
        return None;
    }

    let format_error = |message: String| {
        ValidationIssue::error(IssueKind::OverrideFormat, message)
            .for_entity(kind)
            .in_file(path)
    };

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            issues.push(format_error(format!("failed to read file: {}", e)));
            return None;
        }
    };
    if crate::core::config::is_blank_yaml(&content) {
        return Some(CurationFile::empty(path));
    }

    let value: serde_yml::Value = match serde_yml::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            issues.push(format_error(format!("not valid YAML, file skipped: {}", e)));
            return None;
        }
    };
    let Some(top) = value.as_mapping() else {
        issues.push(format_error("top level must be a mapping, file skipped".to_string()));
        return None;
    };

    let mut file = CurationFile::empty(path);
    file.version = top.get("version").and_then(scalar_string);
    file.last_modified = top.get("last_modified").and_then(scalar_string);

    let records = match top.get(section) {
        None | Some(serde_yml::Value::Null) => return Some(file),
        Some(serde_yml::Value::Mapping(records)) => records,
        Some(_) => {
            issues.push(format_error(format!("'{}' must be a mapping of id to record, file skipped", section)));
            return None;
        }
    };

    for (key, record) in records {
        let Some(id) = key_to_id(key) else {
            issues.push(format_error(format!("key {:?} is not a non-negative integer id, skipped", key)));
            continue;
        };
        if file.records.contains_key(&id) {
            issues.push(
                format_error(format!("id {} listed more than once, keeping the first", id)).with_ids([id]),
            );
            continue;
        }
        match serde_yml::from_value::<T>(record.clone()) {
            Ok(parsed) => {
                file.records.insert(id, parsed);
            }
            Err(e) => issues.push(format_error(format!("record for id {} skipped: {}", id, e)).with_ids([id])),
        }
    }

    tracing::debug!(file = %path.display(), records = file.records.len(), "loaded {}", section);
    Some(file)
}

fn key_to_id(key: &serde_yml::Value) -> Option<u32> {
    match key {
        serde_yml::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_yml::Value::String(s) => parse_id(s),
        _ => None,
    }
}

fn scalar_string(value: &serde_yml::Value) -> Option<String> {
    match value {
        serde_yml::Value::String(s) => Some(s.clone()),
        serde_yml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
