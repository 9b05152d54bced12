//! Validation of merged entity maps
//!
//! Classifies problems only; records are never modified here.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::identity::EntityKind;
use crate::core::issue::{IssueKind, ValidationIssue};
use crate::core::overrides::CurationSet;
use crate::db::merge::EntityMap;
use crate::rules::looks_like_placeholder;

/// Runs the duplicate, ambiguity and structural scans for one type
#[derive(Debug, Clone)]
pub struct Validator<'a> {
    markers: &'a [String],
}

impl<'a> Validator<'a> {
    pub fn new(markers: &'a [String]) -> Self {
        Self { markers }
    }

    /// All issues for one merged type
    ///
    /// `template_ids` is the set of ids seen in any template for this type.
    pub fn validate(
        &self,
        kind: EntityKind,
        records: &EntityMap,
        template_ids: &BTreeSet<u32>,
        curation: Option<&CurationSet>,
    ) -> Vec<ValidationIssue> {
        let mut issues = duplicate_names(kind, records);
        issues.extend(self.ambiguous_names(kind, records));
        if let Some(curation) = curation {
            issues.extend(unmatched_curation(kind, template_ids, curation));
        }
        issues
    }

    /// Whether a name still carries a placeholder marker (case-insensitive)
    pub fn is_ambiguous(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        name.trim().is_empty()
            || self
                .markers
                .iter()
                .any(|m| !m.is_empty() && lowered.contains(&m.to_lowercase()))
            || looks_like_placeholder(name)
    }

    /// One warning per named entry whose name is incomplete
    pub fn ambiguous_names(&self, kind: EntityKind, records: &EntityMap) -> Vec<ValidationIssue> {
        records
            .values()
            .filter_map(|record| {
                let name = record.name.as_deref()?;
                self.is_ambiguous(name).then(|| {
                    ValidationIssue::warning(
                        IssueKind::AmbiguousName,
                        format!(
                            "name '{}' looks incomplete ({})",
                            name, record.provenance
                        ),
                    )
                    .for_entity(kind)
                    .with_ids([record.id])
                })
            })
            .collect()
    }
}

/// One warning per extra id sharing a name, paired with the lowest id
pub fn duplicate_names(kind: EntityKind, records: &EntityMap) -> Vec<ValidationIssue> {
    let mut by_name: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
    for record in records.values() {
        if let Some(name) = record.name.as_deref() {
            by_name.entry(name.trim()).or_default().push(record.id);
        }
    }

    let mut issues = Vec::new();
    for (name, ids) in by_name {
        let Some((first, extras)) = ids.split_first() else {
            continue;
        };
        for extra in extras {
            issues.push(
                ValidationIssue::warning(
                    IssueKind::DuplicateName,
                    format!("ids {} and {} are both named '{}'", first, extra, name),
                )
                .for_entity(kind)
                .with_ids([*first, *extra]),
            );
        }
    }
    issues
}

/// Curation entries for ids never seen in any template
pub fn unmatched_curation(
    kind: EntityKind,
    template_ids: &BTreeSet<u32>,
    curation: &CurationSet,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for id in curation.override_ids() {
        if !template_ids.contains(&id) {
            let mut issue = ValidationIssue::warning(
                IssueKind::UnmatchedOverride,
                format!("override for id {} has no template; entry added from override only", id),
            )
            .for_entity(kind)
            .with_ids([id]);
            if let Some(file) = &curation.overrides {
                issue = issue.in_file(&file.path);
            }
            issues.push(issue);
        }
    }

    for id in curation.correction_ids() {
        if !template_ids.contains(&id) && curation.override_for(id).is_none() {
            let mut issue = ValidationIssue::warning(
                IssueKind::UnmatchedCorrection,
                format!("correction for id {} matches no entry and was not applied", id),
            )
            .for_entity(kind)
            .with_ids([id]);
            if let Some(file) = &curation.corrections {
                issue = issue.in_file(&file.path);
            }
            issues.push(issue);
        }
    }

    issues
}
