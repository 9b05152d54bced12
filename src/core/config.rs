//! Configuration management with layered hierarchy

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::identity::{EntityKind, ReferenceKind};
use crate::core::Project;

/// Per-type template settings
///
/// `active: false` records a deliberate decision to skip a type, as opposed
/// to an active type whose directory simply has not been created yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeConfig {
    pub directory: PathBuf,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// A pattern that derives a tag or mechanic label from record text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Label to attach when the pattern matches
    #[serde(alias = "tag", alias = "mechanic")]
    pub label: String,
    /// Regex matched against name and description
    pub pattern: String,
}

impl PatternRule {
    fn new(label: &str, pattern: &str) -> Self {
        Self {
            label: label.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

/// Resolved build configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Game content version stamped into the snapshot header
    pub content_version: String,
    pub templates_dir: PathBuf,
    pub overrides_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Extraction worker threads (0 = one per core)
    pub threads: usize,
    pub entity_types: BTreeMap<EntityKind, EntityTypeConfig>,
    pub references: BTreeMap<ReferenceKind, PathBuf>,
    /// Substrings that mark a name as incomplete
    pub placeholder_markers: Vec<String>,
    pub tag_rules: Vec<PatternRule>,
    pub mechanic_rules: Vec<PatternRule>,
    /// Tag combinations whose intersections are precomputed
    pub tag_pairs: Vec<(String, String)>,
    /// Number of issues listed inline in the build summary
    pub summary_issue_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        let entity_types = EntityKind::all()
            .iter()
            .map(|kind| {
                (
                    *kind,
                    EntityTypeConfig {
                        directory: PathBuf::from(kind.default_directory()),
                        active: true,
                    },
                )
            })
            .collect();
        let references = ReferenceKind::all()
            .iter()
            .map(|kind| (*kind, PathBuf::from(kind.default_file())))
            .collect();

        Self {
            content_version: "unversioned".to_string(),
            templates_dir: PathBuf::from("templates"),
            overrides_dir: PathBuf::from("overrides"),
            output_dir: PathBuf::from("database"),
            threads: 0,
            entity_types,
            references,
            placeholder_markers: vec!["Unknown".to_string(), "???".to_string()],
            tag_rules: default_tag_rules(),
            mechanic_rules: default_mechanic_rules(),
            tag_pairs: vec![
                ("minion".to_string(), "damage".to_string()),
                ("critical".to_string(), "damage".to_string()),
                ("health".to_string(), "minion".to_string()),
            ],
            summary_issue_limit: 10,
        }
    }
}

fn default_tag_rules() -> Vec<PatternRule> {
    vec![
        PatternRule::new("minion", r"(?i)\bminions?\b"),
        PatternRule::new("damage", r"(?i)\bdamage\b"),
        PatternRule::new("health", r"(?i)\b(health|life)\b"),
        PatternRule::new("mana", r"(?i)\bmana\b"),
        PatternRule::new("critical", r"(?i)\bcrit(ical)?\b"),
        PatternRule::new("resistance", r"(?i)\bresist(ance)?s?\b"),
        PatternRule::new("armor", r"(?i)\barmou?r\b"),
        PatternRule::new("speed", r"(?i)\bspeed\b"),
        PatternRule::new("fire", r"(?i)\bfire\b"),
        PatternRule::new("cold", r"(?i)\bcold\b"),
        PatternRule::new("lightning", r"(?i)\blightning\b"),
        PatternRule::new("void", r"(?i)\bvoid\b"),
        PatternRule::new("necrotic", r"(?i)\bnecrotic\b"),
        PatternRule::new("physical", r"(?i)\bphysical\b"),
    ]
}

fn default_mechanic_rules() -> Vec<PatternRule> {
    vec![
        PatternRule::new("bleed", r"(?i)\bbleed(ing)?\b"),
        PatternRule::new("ignite", r"(?i)\bignite\b"),
        PatternRule::new("poison", r"(?i)\bpoison\b"),
        PatternRule::new("shock", r"(?i)\bshock\b"),
        PatternRule::new("chill", r"(?i)\bchill\b"),
        PatternRule::new("freeze", r"(?i)\bfreeze\b"),
        PatternRule::new("ward", r"(?i)\bward\b"),
        PatternRule::new("block", r"(?i)\bblock\b"),
        PatternRule::new("dodge", r"(?i)\bdodge\b"),
        PatternRule::new("summon", r"(?i)\bminions?\b|\bsummon"),
    ]
}

/// One layer of configuration as read from a YAML file; every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigLayer {
    content_version: Option<String>,
    templates_dir: Option<PathBuf>,
    overrides_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    threads: Option<usize>,
    entity_types: Option<BTreeMap<EntityKind, EntityTypeConfig>>,
    references: Option<BTreeMap<ReferenceKind, PathBuf>>,
    placeholder_markers: Option<Vec<String>>,
    tag_rules: Option<Vec<PatternRule>>,
    mechanic_rules: Option<Vec<PatternRule>>,
    tag_pairs: Option<Vec<(String, String)>>,
    summary_issue_limit: Option<usize>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(project: &Project) -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let project_file = project.config_path();
        let mut config = Self::load_layers(global.as_deref(), Some(&project_file))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Merge defaults with the given config files (later files win)
    pub fn load_layers(
        global: Option<&Path>,
        project: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        // 1. Built-in defaults
        let mut config = Config::default();

        // 2. Global user config, 3. project config
        for path in [global, project].into_iter().flatten() {
            if path.exists() {
                config.merge(Self::read_layer(path)?);
            }
        }

        Ok(config)
    }

    fn read_layer(path: &Path) -> Result<ConfigLayer, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if is_blank_yaml(&contents) {
            return Ok(ConfigLayer::default());
        }
        serde_yml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// 4. Environment variables
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(version) = lookup("LOOTDB_CONTENT_VERSION") {
            self.content_version = version;
        }
        if let Some(output) = lookup("LOOTDB_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(output);
        }
        if let Some(threads) = lookup("LOOTDB_THREADS") {
            self.threads = threads.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "LOOTDB_THREADS".to_string(),
                value: threads.clone(),
            })?;
        }
        Ok(())
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "lootdb")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another layer into this one (other takes precedence)
    fn merge(&mut self, other: ConfigLayer) {
        if let Some(version) = other.content_version {
            self.content_version = version;
        }
        if let Some(dir) = other.templates_dir {
            self.templates_dir = dir;
        }
        if let Some(dir) = other.overrides_dir {
            self.overrides_dir = dir;
        }
        if let Some(dir) = other.output_dir {
            self.output_dir = dir;
        }
        if let Some(threads) = other.threads {
            self.threads = threads;
        }
        if let Some(types) = other.entity_types {
            self.entity_types.extend(types);
        }
        if let Some(references) = other.references {
            self.references.extend(references);
        }
        if let Some(markers) = other.placeholder_markers {
            self.placeholder_markers = markers;
        }
        if let Some(rules) = other.tag_rules {
            self.tag_rules = rules;
        }
        if let Some(rules) = other.mechanic_rules {
            self.mechanic_rules = rules;
        }
        if let Some(pairs) = other.tag_pairs {
            self.tag_pairs = pairs;
        }
        if let Some(limit) = other.summary_issue_limit {
            self.summary_issue_limit = limit;
        }
    }

    /// Template settings for a type, if it is active
    pub fn active_type(&self, kind: EntityKind) -> Option<&EntityTypeConfig> {
        self.entity_types.get(&kind).filter(|t| t.active)
    }

    /// File name of a reference table
    pub fn reference_file(&self, kind: ReferenceKind) -> PathBuf {
        self.references
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(kind.default_file()))
    }
}

/// True for a YAML document holding only comments and whitespace
pub(crate) fn is_blank_yaml(contents: &str) -> bool {
    contents.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    })
}

/// Errors loading configuration
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {message}")]
    #[diagnostic(code(lootdb::config::read))]
    Read { path: PathBuf, message: String },

    #[error("invalid config {path:?}: {message}")]
    #[diagnostic(
        code(lootdb::config::parse),
        help("check the field names and types in the config file")
    )]
    Parse { path: PathBuf, message: String },

    #[error("invalid value '{value}' for {var}")]
    #[diagnostic(code(lootdb::config::env))]
    InvalidEnv { var: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_enable_all_types() {
        let config = Config::default();
        for kind in EntityKind::all() {
            assert!(config.active_type(*kind).is_some());
        }
        assert_eq!(
            config.reference_file(ReferenceKind::Beams),
            PathBuf::from("beams.xml")
        );
    }

    #[test]
    fn test_project_layer_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "content_version: \"1.2.0\"\nentity_types:\n  sets:\n    directory: set_rules\n    active: false\n",
        )
        .unwrap();

        let config = Config::load_layers(None, Some(&path)).unwrap();
        assert_eq!(config.content_version, "1.2.0");
        assert!(config.active_type(EntityKind::Set).is_none());
        assert!(config.active_type(EntityKind::Affix).is_some());
        assert_eq!(
            config.entity_types[&EntityKind::Set].directory,
            PathBuf::from("set_rules")
        );
    }

    #[test]
    fn test_later_layer_wins() {
        let dir = tempdir().unwrap();
        let global = dir.path().join("global.yaml");
        let project = dir.path().join("project.yaml");
        std::fs::write(&global, "threads: 2\noutput_dir: out_global\n").unwrap();
        std::fs::write(&project, "output_dir: out_project\n").unwrap();

        let config = Config::load_layers(Some(&global), Some(&project)).unwrap();
        assert_eq!(config.threads, 2);
        assert_eq!(config.output_dir, PathBuf::from("out_project"));
    }

    #[test]
    fn test_comment_only_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "# lootdb config\n\n# threads: 4\n").unwrap();

        let config = Config::load_layers(None, Some(&path)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_unknown_field_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "content_verison: typo\n").unwrap();

        let err = Config::load_layers(None, Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("LOOTDB_THREADS", "3"), ("LOOTDB_CONTENT_VERSION", "9")]
            .into_iter()
            .collect();
        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.threads, 3);
        assert_eq!(config.content_version, "9");

        let err = config
            .apply_env(|key| (key == "LOOTDB_THREADS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }
}
