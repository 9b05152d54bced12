//! Derived lookup indexes
//!
//! Everything here is rebuilt from the snapshot on every run. A failure
//! in one optional index (tags, mechanics) degrades only that index.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::core::config::{Config, PatternRule};
use crate::core::entity::EntityRecord;
use crate::core::identity::EntityKind;
use crate::core::issue::{IssueKind, ValidationIssue};
use crate::db::snapshot::DatabaseSnapshot;

/// Index directory inside the output directory
pub const INDEX_DIR: &str = "index";
pub const IDS_FILE: &str = "ids.json";
pub const TAGS_FILE: &str = "tags.json";
pub const MECHANICS_FILE: &str = "mechanics.json";

/// Ids per entity type, ascending
pub type IdsByKind = BTreeMap<EntityKind, Vec<u32>>;

/// `{type: {id: record}}` for direct lookups
///
/// Every index carries the `sources_digest` of the snapshot it was derived
/// from; readers discard an index whose digest differs from the snapshot's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifierIndex {
    #[serde(default)]
    pub sources_digest: String,
    entries: BTreeMap<EntityKind, IndexMap<u32, EntityRecord>>,
}

impl IdentifierIndex {
    pub fn from_snapshot(snapshot: &DatabaseSnapshot) -> Self {
        let entries = snapshot
            .entities
            .iter()
            .map(|(kind, records)| {
                let map = records.iter().map(|r| (r.id, r.clone())).collect();
                (*kind, map)
            })
            .collect();
        Self {
            sources_digest: snapshot.metadata.sources_digest.clone(),
            entries,
        }
    }

    pub fn get(&self, kind: EntityKind, id: u32) -> Option<&EntityRecord> {
        self.entries.get(&kind).and_then(|m| m.get(&id))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `{tag: {type: [ids]}}` plus declared pairwise intersections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagIndex {
    #[serde(default)]
    pub sources_digest: String,
    pub tags: BTreeMap<String, IdsByKind>,
    /// Keyed `"<a>+<b>"` for each declared pair
    pub intersections: BTreeMap<String, IdsByKind>,
}

impl TagIndex {
    pub fn tagged(&self, tag: &str) -> Option<&IdsByKind> {
        self.tags
            .get(&tag.to_lowercase())
            .or_else(|| self.intersections.get(&tag.to_lowercase()))
    }
}

/// `{mechanic: {type: [ids]}}` and the reverse relation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MechanicIndex {
    #[serde(default)]
    pub sources_digest: String,
    pub mechanics: BTreeMap<String, IdsByKind>,
    pub by_entity: BTreeMap<EntityKind, BTreeMap<u32, Vec<String>>>,
}

/// An optional index that could not be built
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("invalid {index} pattern for '{label}': {message}")]
    InvalidPattern {
        index: &'static str,
        label: String,
        message: String,
    },
}

/// All derived indexes for one snapshot
#[derive(Debug, Clone)]
pub struct IndexSet {
    pub ids: IdentifierIndex,
    pub tags: Result<TagIndex, IndexError>,
    pub mechanics: Result<MechanicIndex, IndexError>,
}

/// Build every index; degraded indexes are reported as error issues
pub fn build_indexes(snapshot: &DatabaseSnapshot, config: &Config) -> (IndexSet, Vec<ValidationIssue>) {
    let mut issues = Vec::new();

    let ids = IdentifierIndex::from_snapshot(snapshot);
    let tags = build_tag_index(snapshot, &config.tag_rules, &config.tag_pairs, &mut issues);
    let mechanics = build_mechanic_index(snapshot, &config.mechanic_rules, &mut issues);

    for err in [tags.as_ref().err(), mechanics.as_ref().err()].into_iter().flatten() {
        issues.push(ValidationIssue::error(
            IssueKind::IndexDegraded,
            format!("{}; index not written", err),
        ));
    }

    (IndexSet { ids, tags, mechanics }, issues)
}

/// Compile labelled patterns, failing on the first invalid one
fn compile_rules(index: &'static str, rules: &[PatternRule]) -> Result<Vec<(String, Regex)>, IndexError> {
    rules
        .iter()
        .map(|rule| {
            Regex::new(&rule.pattern)
                .map(|re| (rule.label.to_lowercase(), re))
                .map_err(|e| IndexError::InvalidPattern {
                    index,
                    label: rule.label.clone(),
                    message: e.to_string(),
                })
        })
        .collect()
}

/// Labels for a record: explicit property values plus pattern matches
fn labels_for(
    kind: EntityKind,
    record: &EntityRecord,
    property: &str,
    rules: &[(String, Regex)],
    issues: &mut Vec<ValidationIssue>,
) -> BTreeSet<String> {
    let mut labels = BTreeSet::new();
    if record.is_missing() {
        return labels;
    }

    let (values, rejected) = record.string_list(property);
    if rejected > 0 {
        issues.push(
            ValidationIssue::warning(
                IssueKind::IndexDegraded,
                format!("{} non-string '{}' entries ignored", rejected, property),
            )
            .for_entity(kind)
            .with_ids([record.id]),
        );
    }
    labels.extend(values.into_iter().map(|v| v.to_lowercase()));

    let texts = [record.name.as_deref(), record.description.as_deref()];
    for (label, re) in rules {
        if texts.iter().flatten().any(|text| re.is_match(text)) {
            labels.insert(label.clone());
        }
    }
    labels
}

/// Invert per-record labels into label → type → ids
fn invert(
    snapshot: &DatabaseSnapshot,
    property: &str,
    rules: &[(String, Regex)],
    issues: &mut Vec<ValidationIssue>,
) -> (BTreeMap<String, IdsByKind>, BTreeMap<EntityKind, BTreeMap<u32, Vec<String>>>) {
    let mut inverted: BTreeMap<String, IdsByKind> = BTreeMap::new();
    let mut forward: BTreeMap<EntityKind, BTreeMap<u32, Vec<String>>> = BTreeMap::new();

    for (kind, records) in &snapshot.entities {
        for record in records {
            let labels = labels_for(*kind, record, property, rules, issues);
            if labels.is_empty() {
                continue;
            }
            for label in &labels {
                inverted
                    .entry(label.clone())
                    .or_default()
                    .entry(*kind)
                    .or_default()
                    .push(record.id);
            }
            forward
                .entry(*kind)
                .or_default()
                .insert(record.id, labels.into_iter().collect());
        }
    }

    (inverted, forward)
}

pub fn build_tag_index(
    snapshot: &DatabaseSnapshot,
    rules: &[PatternRule],
    pairs: &[(String, String)],
    issues: &mut Vec<ValidationIssue>,
) -> Result<TagIndex, IndexError> {
    let compiled = compile_rules("tag", rules)?;
    let (tags, _) = invert(snapshot, "tags", &compiled, issues);

    let mut intersections = BTreeMap::new();
    for (a, b) in pairs {
        let (a, b) = (a.to_lowercase(), b.to_lowercase());
        let mut both = IdsByKind::new();
        if let (Some(left), Some(right)) = (tags.get(&a), tags.get(&b)) {
            for (kind, left_ids) in left {
                let Some(right_ids) = right.get(kind) else {
                    continue;
                };
                let right_set: BTreeSet<u32> = right_ids.iter().copied().collect();
                let common: Vec<u32> = left_ids
                    .iter()
                    .copied()
                    .filter(|id| right_set.contains(id))
                    .collect();
                if !common.is_empty() {
                    both.insert(*kind, common);
                }
            }
        }
        intersections.insert(format!("{}+{}", a, b), both);
    }

    Ok(TagIndex {
        sources_digest: snapshot.metadata.sources_digest.clone(),
        tags,
        intersections,
    })
}

pub fn build_mechanic_index(
    snapshot: &DatabaseSnapshot,
    rules: &[PatternRule],
    issues: &mut Vec<ValidationIssue>,
) -> Result<MechanicIndex, IndexError> {
    let compiled = compile_rules("mechanic", rules)?;
    let (mechanics, by_entity) = invert(snapshot, "mechanics", &compiled, issues);
    Ok(MechanicIndex {
        sources_digest: snapshot.metadata.sources_digest.clone(),
        mechanics,
        by_entity,
    })
}

/// Pretty JSON with a trailing newline
pub fn to_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::ReferenceTables;
    use crate::db::merge::{EntityMap, MergeStats};
    use crate::db::snapshot::{assemble, AssemblyInfo};
    use chrono::Utc;
    use serde_json::json;

    fn snapshot(records: Vec<EntityRecord>) -> DatabaseSnapshot {
        let map: EntityMap = records.into_iter().map(|r| (r.id, r)).collect();
        let mut maps = BTreeMap::new();
        maps.insert(EntityKind::Affix, map);
        assemble(
            AssemblyInfo {
                content_version: "test".to_string(),
                source_timestamp: Utc::now(),
                sources_digest: "d1".to_string(),
                stats: MergeStats::default(),
                curation_versions: BTreeMap::new(),
                inactive_types: Vec::new(),
            },
            ReferenceTables::default(),
            &maps,
        )
    }

    fn rule(label: &str, pattern: &str) -> PatternRule {
        PatternRule {
            label: label.to_string(),
            pattern: pattern.to_string(),
        }
    }

    #[test]
    fn test_identifier_index_lookup() {
        let snap = snapshot(vec![
            EntityRecord::discovered(140, "+# to Minion Damage"),
            EntityRecord::missing(3),
        ]);
        let ids = IdentifierIndex::from_snapshot(&snap);
        assert_eq!(
            ids.get(EntityKind::Affix, 140).and_then(|r| r.name.as_deref()),
            Some("+# to Minion Damage")
        );
        assert!(ids.get(EntityKind::Unique, 140).is_none());
        assert_eq!(ids.len(), 2);

        let json = to_json(&ids).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["entries"]["affixes"]["140"]["name"], "+# to Minion Damage");
        assert_eq!(value["sources_digest"], "d1");
    }

    #[test]
    fn test_tags_from_properties_and_rules() {
        let mut tagged = EntityRecord::discovered(1, "Increased Minion Damage");
        tagged.properties.insert("tags".to_string(), json!(["Summoner", 5]));
        let snap = snapshot(vec![tagged, EntityRecord::missing(2)]);

        let mut issues = Vec::new();
        let index = build_tag_index(
            &snap,
            &[rule("minion", r"(?i)minion"), rule("damage", r"(?i)damage")],
            &[("minion".to_string(), "damage".to_string())],
            &mut issues,
        )
        .unwrap();

        assert_eq!(index.tags["summoner"][&EntityKind::Affix], vec![1]);
        assert_eq!(index.tags["minion"][&EntityKind::Affix], vec![1]);
        assert_eq!(index.intersections["minion+damage"][&EntityKind::Affix], vec![1]);
        assert_eq!(index.sources_digest, "d1");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::IndexDegraded);
        assert!(!issues[0].is_error());
    }

    #[test]
    fn test_only_declared_pairs_intersected() {
        let snap = snapshot(vec![EntityRecord::discovered(1, "Fire Cold")]);
        let mut issues = Vec::new();
        let index = build_tag_index(
            &snap,
            &[rule("fire", "Fire"), rule("cold", "Cold")],
            &[],
            &mut issues,
        )
        .unwrap();
        assert!(index.intersections.is_empty());
    }

    #[test]
    fn test_invalid_pattern_degrades_only_that_index() {
        let snap = snapshot(vec![EntityRecord::discovered(1, "Bleed Chance")]);
        let mut config = Config::default();
        config.tag_rules = vec![rule("broken", "(unclosed")];

        let (set, issues) = build_indexes(&snap, &config);
        assert!(set.tags.is_err());
        assert!(set.mechanics.is_ok());
        assert!(set.ids.get(EntityKind::Affix, 1).is_some());
        assert_eq!(issues.iter().filter(|i| i.is_error()).count(), 1);
    }

    #[test]
    fn test_mechanic_reverse_relation() {
        let mut record = EntityRecord::discovered(9, "Chance to Bleed");
        record.properties.insert("mechanics".to_string(), json!(["ignite"]));
        let snap = snapshot(vec![record]);

        let mut issues = Vec::new();
        let index = build_mechanic_index(&snap, &[rule("bleed", r"(?i)bleed")], &mut issues).unwrap();
        assert_eq!(index.mechanics["bleed"][&EntityKind::Affix], vec![9]);
        assert_eq!(
            index.by_entity[&EntityKind::Affix][&9],
            vec!["bleed".to_string(), "ignite".to_string()]
        );
    }
}
