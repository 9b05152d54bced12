//! Merge engine
//!
//! Precedence per id: template candidate, then override (replaces the
//! payload outright), then correction (relabels an existing name only).

use std::collections::BTreeMap;

use crate::core::entity::{EntityRecord, Provenance};
use crate::core::identity::EntityKind;
use crate::core::issue::{IssueKind, ValidationIssue};
use crate::core::overrides::{CorrectionRecord, CurationSet, OverrideRecord};
use crate::rules::Candidate;

/// Final per-type map, ordered by id
pub type EntityMap = BTreeMap<u32, EntityRecord>;

/// Counts reported by one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub overrides_applied: usize,
    pub corrections_applied: usize,
}

/// Output of merging one entity type
#[derive(Debug, Clone, Default)]
pub struct MergeOutput {
    pub records: EntityMap,
    pub stats: MergeStats,
    pub issues: Vec<ValidationIssue>,
}

/// Merge template candidates with overrides and corrections for one type
pub fn merge(
    kind: EntityKind,
    candidates: &BTreeMap<u32, Candidate>,
    curation: &CurationSet,
) -> MergeOutput {
    let mut records = base_records(candidates);
    let mut stats = MergeStats::default();
    let mut issues = Vec::new();

    if let Some(file) = &curation.overrides {
        stats.overrides_applied = apply_overrides(&mut records, &file.records);
    }
    if let Some(file) = &curation.corrections {
        stats.corrections_applied =
            apply_corrections(kind, &mut records, &file.records, &mut issues);
    }

    tracing::debug!(
        entity = %kind,
        records = records.len(),
        overrides = stats.overrides_applied,
        corrections = stats.corrections_applied,
        "merged"
    );

    MergeOutput {
        records,
        stats,
        issues,
    }
}

/// Step 1: one record per template id, discovered or explicitly missing
pub fn base_records(candidates: &BTreeMap<u32, Candidate>) -> EntityMap {
    candidates
        .iter()
        .map(|(id, candidate)| {
            let record = match &candidate.name {
                Some(name) => EntityRecord::discovered(*id, name.clone()),
                None => EntityRecord::missing(*id),
            };
            (*id, record)
        })
        .collect()
}

/// Step 2: overrides replace the payload; ids absent from templates are added
///
/// Applying the same overrides again yields the same map.
pub fn apply_overrides(records: &mut EntityMap, overrides: &BTreeMap<u32, OverrideRecord>) -> usize {
    for (id, record) in overrides {
        let entry = records
            .entry(*id)
            .or_insert_with(|| EntityRecord::missing(*id));
        entry.set_name(Some(record.name.clone()));
        entry.description = record.description.clone();
        entry.properties = record.properties.clone();
        entry.notes = record.notes.iter().cloned().collect();
        entry.provenance = Provenance::OverrideApplied;
    }
    overrides.len()
}

/// Step 3: corrections rename entries that already have a name
///
/// Ids with no entry are left to the structural scan; ids without a name
/// stay missing. A correction whose name is already in place is skipped.
pub fn apply_corrections(
    kind: EntityKind,
    records: &mut EntityMap,
    corrections: &BTreeMap<u32, CorrectionRecord>,
    issues: &mut Vec<ValidationIssue>,
) -> usize {
    let mut applied = 0;

    for (id, correction) in corrections {
        let Some(record) = records.get_mut(id) else {
            continue;
        };
        let Some(current) = record.name.clone() else {
            issues.push(
                ValidationIssue::warning(
                    IssueKind::CorrectionNoOp,
                    format!(
                        "correction to '{}' ignored: id {} has not been discovered yet",
                        correction.name, id
                    ),
                )
                .for_entity(kind)
                .with_ids([*id]),
            );
            continue;
        };
        if current == correction.name {
            continue;
        }

        if let Some(expected) = &correction.original_name {
            if *expected != current {
                issues.push(
                    ValidationIssue::warning(
                        IssueKind::CorrectionMismatch,
                        format!(
                            "correction for id {} expected to replace '{}' but found '{}'; applied anyway",
                            id, expected, current
                        ),
                    )
                    .for_entity(kind)
                    .with_ids([*id]),
                );
            }
        }

        let mut note = format!("corrected from '{}' ({})", current, correction.reason);
        if let Some(extra) = &correction.notes {
            note.push_str(": ");
            note.push_str(extra);
        }
        record.set_name(Some(correction.name.clone()));
        record.notes.push(note);
        record.provenance = Provenance::CorrectionApplied;
        applied += 1;
    }

    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::RecordStatus;
    use crate::core::overrides::{CorrectionReason, CurationFile};
    use std::path::PathBuf;

    fn candidate(name: Option<&str>) -> Candidate {
        Candidate {
            name: name.map(str::to_string),
            source: PathBuf::from("t.xml"),
            rule_index: 0,
        }
    }

    fn override_record(name: &str) -> OverrideRecord {
        OverrideRecord {
            name: name.to_string(),
            description: None,
            properties: Default::default(),
            notes: None,
        }
    }

    fn correction(name: &str, reason: CorrectionReason) -> CorrectionRecord {
        CorrectionRecord {
            name: name.to_string(),
            original_name: None,
            reason,
            notes: None,
        }
    }

    fn curation(
        overrides: Vec<(u32, OverrideRecord)>,
        corrections: Vec<(u32, CorrectionRecord)>,
    ) -> CurationSet {
        CurationSet {
            overrides: Some(CurationFile {
                path: PathBuf::from("affix_overrides.yaml"),
                version: None,
                last_modified: None,
                records: overrides.into_iter().collect(),
            }),
            corrections: Some(CurationFile {
                path: PathBuf::from("affix_corrections.yaml"),
                version: None,
                last_modified: None,
                records: corrections.into_iter().collect(),
            }),
        }
    }

    #[test]
    fn test_override_fills_placeholder() {
        let candidates: BTreeMap<_, _> = [(140, candidate(None))].into_iter().collect();
        let set = curation(vec![(140, override_record("+# to Minion Damage"))], vec![]);

        let out = merge(EntityKind::Affix, &candidates, &set);
        let record = &out.records[&140];
        assert_eq!(record.name.as_deref(), Some("+# to Minion Damage"));
        assert_eq!(record.provenance, Provenance::OverrideApplied);
        assert_eq!(record.status, RecordStatus::Discovered);
        assert_eq!(out.stats.overrides_applied, 1);
    }

    #[test]
    fn test_override_beats_template_name() {
        let candidates: BTreeMap<_, _> = [(5, candidate(Some("Template Name")))].into_iter().collect();
        let mut over = override_record("Curated Name");
        over.description = Some("from testing".to_string());
        let set = curation(vec![(5, over)], vec![]);

        let out = merge(EntityKind::Affix, &candidates, &set);
        assert_eq!(out.records[&5].name.as_deref(), Some("Curated Name"));
        assert_eq!(out.records[&5].description.as_deref(), Some("from testing"));
    }

    #[test]
    fn test_overrides_are_idempotent() {
        let candidates: BTreeMap<_, _> =
            [(1, candidate(Some("A"))), (2, candidate(None))].into_iter().collect();
        let overrides: BTreeMap<_, _> = [(2, override_record("B")), (9, override_record("C"))]
            .into_iter()
            .collect();

        let mut once = base_records(&candidates);
        apply_overrides(&mut once, &overrides);
        let mut twice = once.clone();
        apply_overrides(&mut twice, &overrides);
        assert_eq!(once, twice);
        assert!(once.contains_key(&9));
    }

    #[test]
    fn test_correction_noop_on_missing_name() {
        let candidates: BTreeMap<_, _> = [(7, candidate(None))].into_iter().collect();
        let set = curation(vec![], vec![(7, correction("Renamed", CorrectionReason::Typo))]);

        let out = merge(EntityKind::Affix, &candidates, &set);
        assert!(out.records[&7].name.is_none());
        assert_eq!(out.records[&7].status, RecordStatus::Missing);
        assert_eq!(out.stats.corrections_applied, 0);
        assert_eq!(out.issues[0].kind, IssueKind::CorrectionNoOp);
    }

    #[test]
    fn test_correction_never_creates_entries() {
        let candidates: BTreeMap<_, _> = [(1, candidate(Some("A")))].into_iter().collect();
        let set = curation(vec![], vec![(99, correction("Ghost", CorrectionReason::Other))]);

        let out = merge(EntityKind::Affix, &candidates, &set);
        assert!(!out.records.contains_key(&99));
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn test_correction_relabels_and_notes() {
        let candidates: BTreeMap<_, _> = [(100, candidate(Some("Health")))].into_iter().collect();
        let mut fix = correction("Health (Helmet)", CorrectionReason::DuplicateName);
        fix.notes = Some("helmet-only roll".to_string());
        let set = curation(vec![], vec![(100, fix)]);

        let out = merge(EntityKind::Affix, &candidates, &set);
        let record = &out.records[&100];
        assert_eq!(record.name.as_deref(), Some("Health (Helmet)"));
        assert_eq!(record.provenance, Provenance::CorrectionApplied);
        assert_eq!(
            record.notes,
            vec!["corrected from 'Health' (duplicate-name): helmet-only roll".to_string()]
        );
        assert!(out.issues.is_empty());
    }

    #[test]
    fn test_correction_applies_on_top_of_override() {
        let candidates: BTreeMap<_, _> = [(3, candidate(None))].into_iter().collect();
        let set = curation(
            vec![(3, override_record("Armor"))],
            vec![(3, correction("Armour", CorrectionReason::Typo))],
        );

        let out = merge(EntityKind::Affix, &candidates, &set);
        assert_eq!(out.records[&3].name.as_deref(), Some("Armour"));
        assert_eq!(out.records[&3].provenance, Provenance::CorrectionApplied);
    }

    #[test]
    fn test_correction_mismatch_warns_but_applies() {
        let candidates: BTreeMap<_, _> = [(4, candidate(Some("Mana")))].into_iter().collect();
        let mut fix = correction("Mana Regen", CorrectionReason::Ambiguous);
        fix.original_name = Some("Mana Pool".to_string());
        let set = curation(vec![], vec![(4, fix)]);

        let out = merge(EntityKind::Affix, &candidates, &set);
        assert_eq!(out.records[&4].name.as_deref(), Some("Mana Regen"));
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].kind, IssueKind::CorrectionMismatch);
    }

    #[test]
    fn test_correction_reapplied_is_noop() {
        let mut records = base_records(&[(1, candidate(Some("Old")))].into_iter().collect());
        let corrections: BTreeMap<_, _> =
            [(1, correction("New", CorrectionReason::Typo))].into_iter().collect();
        let mut issues = Vec::new();

        assert_eq!(apply_corrections(EntityKind::Affix, &mut records, &corrections, &mut issues), 1);
        let after_first = records.clone();
        assert_eq!(apply_corrections(EntityKind::Affix, &mut records, &corrections, &mut issues), 0);
        assert_eq!(records, after_first);
    }
}
