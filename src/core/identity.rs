//! Entity kinds and reference table kinds
//!
//! Affix, unique and set ids live in independent numeric namespaces. The
//! three reference tables (colors, sounds, beams) are small closed id→name
//! maps read straight from the template root.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Entity types that carry templates, overrides and corrections
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Item affix (prefix/suffix modifier)
    #[serde(rename = "affixes")]
    Affix,
    /// Unique item
    #[serde(rename = "uniques")]
    Unique,
    /// Set item
    #[serde(rename = "sets")]
    Set,
}

impl EntityKind {
    /// Singular lowercase name, used for file names and CLI arguments
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Affix => "affix",
            EntityKind::Unique => "unique",
            EntityKind::Set => "set",
        }
    }

    /// Plural name, used as the key in snapshots and indexes
    pub fn plural(&self) -> &'static str {
        match self {
            EntityKind::Affix => "affixes",
            EntityKind::Unique => "uniques",
            EntityKind::Set => "sets",
        }
    }

    /// Word used in generated placeholder labels ("Affix ID: 140")
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Affix => "Affix",
            EntityKind::Unique => "Unique",
            EntityKind::Set => "Set",
        }
    }

    /// Default template subdirectory
    pub fn default_directory(&self) -> &'static str {
        self.plural()
    }

    /// File name of this type's override file
    pub fn overrides_file(&self) -> String {
        format!("{}_overrides.yaml", self.as_str())
    }

    /// File name of this type's correction file
    pub fn corrections_file(&self) -> String {
        format!("{}_corrections.yaml", self.as_str())
    }

    /// Get all entity kinds
    pub fn all() -> &'static [EntityKind] {
        &[EntityKind::Affix, EntityKind::Unique, EntityKind::Set]
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = KindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "affix" | "affixes" => Ok(EntityKind::Affix),
            "unique" | "uniques" => Ok(EntityKind::Unique),
            "set" | "sets" => Ok(EntityKind::Set),
            _ => Err(KindParseError::InvalidKind(s.to_string())),
        }
    }
}

/// Reference tables shipped alongside the templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Colors,
    Sounds,
    Beams,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Colors => "colors",
            ReferenceKind::Sounds => "sounds",
            ReferenceKind::Beams => "beams",
        }
    }

    /// Rule field holding the numeric code for this table
    pub fn code_field(&self) -> &'static str {
        match self {
            ReferenceKind::Colors => "color",
            ReferenceKind::Sounds => "SoundId",
            ReferenceKind::Beams => "BeamId",
        }
    }

    /// Default file name in the template root
    pub fn default_file(&self) -> &'static str {
        match self {
            ReferenceKind::Colors => "colors.xml",
            ReferenceKind::Sounds => "sounds.xml",
            ReferenceKind::Beams => "beams.xml",
        }
    }

    pub fn all() -> &'static [ReferenceKind] {
        &[
            ReferenceKind::Colors,
            ReferenceKind::Sounds,
            ReferenceKind::Beams,
        ]
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors parsing a kind name
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KindParseError {
    #[error("unknown entity type '{0}' (expected affix, unique or set)")]
    InvalidKind(String),
}

/// Parse an id key from an override/correction file or the CLI
pub fn parse_id(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}
