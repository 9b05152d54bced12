//! Canonical database snapshot
//!
//! The snapshot is a YAML document with a metadata header, the reference
//! tables and one id-sorted list per entity type. It carries no wall-clock
//! time, so identical inputs serialize to identical bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::entity::{EntityRecord, ReferenceTables};
use crate::core::identity::EntityKind;
use crate::db::merge::{EntityMap, MergeStats};

/// On-disk format version; bumped on any incompatible layout change
pub const FORMAT_VERSION: u32 = 1;

/// Snapshot file name inside the output directory
pub const SNAPSHOT_FILE: &str = "database.yaml";

const HEADER_COMMENT: &str = "# Generated by lootdb. Do not edit by hand; rebuild instead.\n";

/// Discovered vs missing counts for one type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    pub total: usize,
    pub discovered: usize,
    pub missing: usize,
}

impl TypeCounts {
    pub fn of(records: &EntityMap) -> Self {
        let missing = records.values().filter(|r| r.is_missing()).count();
        Self {
            total: records.len(),
            discovered: records.len() - missing,
            missing,
        }
    }
}

/// Snapshot header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub format_version: u32,
    pub content_version: String,
    /// Newest modification time across all build inputs
    pub source_timestamp: DateTime<Utc>,
    /// SHA-256 over the sorted relative input paths
    pub sources_digest: String,
    pub counts: BTreeMap<EntityKind, TypeCounts>,
    pub overrides_applied: usize,
    pub corrections_applied: usize,
    /// Declared `version` of each loaded override/correction file
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub curation_versions: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inactive_types: Vec<EntityKind>,
}

/// The full build artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub metadata: SnapshotMetadata,
    pub references: ReferenceTables,
    pub entities: BTreeMap<EntityKind, Vec<EntityRecord>>,
}

/// Inputs to [`assemble`] besides the merged maps
#[derive(Debug, Clone)]
pub struct AssemblyInfo {
    pub content_version: String,
    pub source_timestamp: DateTime<Utc>,
    pub sources_digest: String,
    pub stats: MergeStats,
    pub curation_versions: BTreeMap<String, String>,
    pub inactive_types: Vec<EntityKind>,
}

/// Build the snapshot from validated per-type maps
pub fn assemble(
    info: AssemblyInfo,
    references: ReferenceTables,
    maps: &BTreeMap<EntityKind, EntityMap>,
) -> DatabaseSnapshot {
    let counts = maps
        .iter()
        .map(|(kind, records)| (*kind, TypeCounts::of(records)))
        .collect();
    let entities = maps
        .iter()
        .map(|(kind, records)| (*kind, records.values().cloned().collect()))
        .collect();

    DatabaseSnapshot {
        metadata: SnapshotMetadata {
            format_version: FORMAT_VERSION,
            content_version: info.content_version,
            source_timestamp: info.source_timestamp,
            sources_digest: info.sources_digest,
            counts,
            overrides_applied: info.stats.overrides_applied,
            corrections_applied: info.stats.corrections_applied,
            curation_versions: info.curation_versions,
            inactive_types: info.inactive_types,
        },
        references,
        entities,
    }
}

impl DatabaseSnapshot {
    /// Serialize to the canonical text form
    pub fn to_yaml(&self) -> Result<String, serde_yml::Error> {
        let body = serde_yml::to_string(self)?;
        Ok(format!("{}{}", HEADER_COMMENT, body))
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(content)
    }

    /// Read only the header, tolerating an unknown body layout
    pub fn read_metadata(content: &str) -> Result<SnapshotMetadata, serde_yml::Error> {
        #[derive(Deserialize)]
        struct HeaderOnly {
            metadata: SnapshotMetadata,
        }
        serde_yml::from_str::<HeaderOnly>(content).map(|h| h.metadata)
    }

    pub fn records(&self, kind: EntityKind) -> &[EntityRecord] {
        self.entities.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total_records(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::{Provenance, RecordStatus};
    use crate::core::identity::ReferenceKind;
    use chrono::TimeZone;

    fn info() -> AssemblyInfo {
        AssemblyInfo {
            content_version: "1.2.0".to_string(),
            source_timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            sources_digest: "abc".to_string(),
            stats: MergeStats {
                overrides_applied: 1,
                corrections_applied: 0,
            },
            curation_versions: BTreeMap::new(),
            inactive_types: vec![EntityKind::Set],
        }
    }

    fn maps() -> BTreeMap<EntityKind, EntityMap> {
        let mut affixes = EntityMap::new();
        affixes.insert(140, EntityRecord::discovered(140, "+# to Minion Damage"));
        affixes.insert(7, EntityRecord::missing(7));
        let mut maps = BTreeMap::new();
        maps.insert(EntityKind::Affix, affixes);
        maps.insert(EntityKind::Unique, EntityMap::new());
        maps
    }

    fn references() -> ReferenceTables {
        let mut refs = ReferenceTables::default();
        let colors: BTreeMap<u32, String> = [(2, "Red".to_string()), (1, "White".to_string())]
            .into_iter()
            .collect();
        refs.set_table(ReferenceKind::Colors, &colors);
        refs
    }

    #[test]
    fn test_assemble_sorts_and_counts() {
        let snapshot = assemble(info(), references(), &maps());
        let ids: Vec<_> = snapshot.records(EntityKind::Affix).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![7, 140]);
        assert_eq!(
            snapshot.metadata.counts[&EntityKind::Affix],
            TypeCounts {
                total: 2,
                discovered: 1,
                missing: 1
            }
        );
        assert_eq!(snapshot.metadata.format_version, FORMAT_VERSION);
        assert_eq!(snapshot.references.colors[0].id, 1);
    }

    #[test]
    fn test_missing_records_are_explicit() {
        let snapshot = assemble(info(), references(), &maps());
        let yaml = snapshot.to_yaml().unwrap();
        assert!(yaml.starts_with("# Generated by lootdb"));
        assert!(yaml.contains("status: missing"));
        assert!(yaml.contains("id: 7"));
    }

    #[test]
    fn test_serialization_is_stable() {
        let a = assemble(info(), references(), &maps()).to_yaml().unwrap();
        let b = assemble(info(), references(), &maps()).to_yaml().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_yaml_reads_back() {
        let snapshot = assemble(info(), references(), &maps());
        let parsed = DatabaseSnapshot::from_yaml(&snapshot.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, snapshot);
        let record = &parsed.records(EntityKind::Affix)[0];
        assert_eq!(record.status, RecordStatus::Missing);
        assert_eq!(record.provenance, Provenance::TemplateDiscovered);
    }

    #[test]
    fn test_read_metadata_only() {
        let yaml = assemble(info(), references(), &maps()).to_yaml().unwrap();
        let meta = DatabaseSnapshot::read_metadata(&yaml).unwrap();
        assert_eq!(meta.content_version, "1.2.0");
        assert_eq!(meta.inactive_types, vec![EntityKind::Set]);
    }
}
