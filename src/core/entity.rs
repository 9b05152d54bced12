//! Entity records and reference entries

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::identity::ReferenceKind;

/// Free-form enrichment fields (`tags`, `mechanics`, anything else)
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Where a record's current payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    #[default]
    TemplateDiscovered,
    OverrideApplied,
    CorrectionApplied,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::TemplateDiscovered => write!(f, "template-discovered"),
            Provenance::OverrideApplied => write!(f, "override-applied"),
            Provenance::CorrectionApplied => write!(f, "correction-applied"),
        }
    }
}

/// Discovery state as written to the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Discovered,
    Missing,
}

/// One affix, unique or set entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: u32,

    /// Explicit marker so consumers can tell "not yet discovered" from absent
    pub status: RecordStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,

    #[serde(default)]
    pub provenance: Provenance,
}

impl EntityRecord {
    /// A placeholder-only record: seen in a template, never identified
    pub fn missing(id: u32) -> Self {
        Self {
            id,
            status: RecordStatus::Missing,
            name: None,
            description: None,
            properties: Properties::new(),
            notes: Vec::new(),
            provenance: Provenance::TemplateDiscovered,
        }
    }

    /// A record discovered from a filled template rule
    pub fn discovered(id: u32, name: impl Into<String>) -> Self {
        let mut record = Self::missing(id);
        record.set_name(Some(name.into()));
        record
    }

    pub fn is_missing(&self) -> bool {
        self.name.is_none()
    }

    /// Set the name and keep `status` consistent with it
    pub fn set_name(&mut self, name: Option<String>) {
        self.status = if name.is_some() {
            RecordStatus::Discovered
        } else {
            RecordStatus::Missing
        };
        self.name = name;
    }

    /// String values of a list-valued property (e.g. `tags`)
    ///
    /// Returns the accepted values and the count of rejected non-string items.
    pub fn string_list(&self, key: &str) -> (Vec<String>, usize) {
        let mut values = Vec::new();
        let mut rejected = 0;
        match self.properties.get(key) {
            Some(serde_json::Value::Array(items)) => {
                for item in items {
                    match item.as_str() {
                        Some(s) if !s.trim().is_empty() => values.push(s.trim().to_string()),
                        _ => rejected += 1,
                    }
                }
            }
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                values.push(s.trim().to_string());
            }
            Some(serde_json::Value::Null) | None => {}
            Some(_) => rejected += 1,
        }
        (values, rejected)
    }
}

/// One row of a reference table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub id: u32,
    pub name: String,
}

/// Colors, sounds and beams, each sorted by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTables {
    #[serde(default)]
    pub colors: Vec<ReferenceEntry>,
    #[serde(default)]
    pub sounds: Vec<ReferenceEntry>,
    #[serde(default)]
    pub beams: Vec<ReferenceEntry>,
}

impl ReferenceTables {
    pub fn table(&self, kind: ReferenceKind) -> &[ReferenceEntry] {
        match kind {
            ReferenceKind::Colors => &self.colors,
            ReferenceKind::Sounds => &self.sounds,
            ReferenceKind::Beams => &self.beams,
        }
    }

    /// Replace a table with entries from an id→name map (already sorted)
    pub fn set_table(&mut self, kind: ReferenceKind, entries: &BTreeMap<u32, String>) {
        let rows = entries
            .iter()
            .map(|(id, name)| ReferenceEntry {
                id: *id,
                name: name.clone(),
            })
            .collect();
        match kind {
            ReferenceKind::Colors => self.colors = rows,
            ReferenceKind::Sounds => self.sounds = rows,
            ReferenceKind::Beams => self.beams = rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_record_serializes_marker() {
        let yaml = serde_yml::to_string(&EntityRecord::missing(7)).unwrap();
        assert!(yaml.contains("status: missing"));
        assert!(!yaml.contains("name:"));
    }

    #[test]
    fn test_set_name_updates_status() {
        let mut record = EntityRecord::missing(1);
        record.set_name(Some("Health".to_string()));
        assert_eq!(record.status, RecordStatus::Discovered);
        record.set_name(None);
        assert_eq!(record.status, RecordStatus::Missing);
        assert!(record.is_missing());
    }

    #[test]
    fn test_string_list_rejects_non_strings() {
        let mut record = EntityRecord::discovered(1, "Health");
        record.properties.insert(
            "tags".to_string(),
            serde_json::json!(["health", 3, "defense"]),
        );
        let (tags, rejected) = record.string_list("tags");
        assert_eq!(tags, vec!["health", "defense"]);
        assert_eq!(rejected, 1);
    }
}
