//! Project discovery and structure

use rust_embed::RustEmbed;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::identity::EntityKind;

/// Marker directory at the project root
const PROJECT_DIR: &str = ".lootdb";

/// Files written by `lootdb init`
#[derive(RustEmbed)]
#[folder = "assets/init/"]
struct InitAssets;

/// Represents a lootdb project: templates, overrides and build output under one root
#[derive(Debug, Clone)]
pub struct Project {
    /// Root directory of the project (parent of .lootdb/)
    root: PathBuf,
}

impl Project {
    /// Find project root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current = std::env::current_dir().map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find project root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            if current.join(PROJECT_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Open a project at an explicit root without walking up
    pub fn at(root: &Path) -> Result<Self, ProjectError> {
        let root = root
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;
        if !root.join(PROJECT_DIR).is_dir() {
            return Err(ProjectError::NotFound {
                searched_from: root,
            });
        }
        Ok(Self { root })
    }

    /// Create a new project structure at the given path
    pub fn init(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if root.join(PROJECT_DIR).exists() {
            return Err(ProjectError::AlreadyExists(root));
        }
        Self::scaffold(root)
    }

    /// Force initialization even if .lootdb/ exists
    ///
    /// Rewrites the project config; existing templates and overrides are kept.
    pub fn init_force(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self::scaffold(root)
    }

    fn scaffold(root: PathBuf) -> Result<Self, ProjectError> {
        let io = |e: std::io::Error| ProjectError::IoError(e.to_string());

        std::fs::create_dir_all(root.join(PROJECT_DIR)).map_err(io)?;
        for kind in EntityKind::all() {
            std::fs::create_dir_all(root.join("templates").join(kind.default_directory()))
                .map_err(io)?;
        }
        std::fs::create_dir_all(root.join("overrides")).map_err(io)?;

        for name in InitAssets::iter() {
            let Some(file) = InitAssets::get(&name) else {
                continue;
            };
            let target = if name == "config.yaml" {
                root.join(PROJECT_DIR).join("config.yaml")
            } else {
                let target = root.join(name.as_ref());
                if target.exists() {
                    continue;
                }
                target
            };
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(io)?;
            }
            std::fs::write(&target, file.data.as_ref()).map_err(io)?;
        }

        Ok(Self { root })
    }

    /// Get the project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .lootdb configuration directory
    pub fn project_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    /// Path of the project configuration file
    pub fn config_path(&self) -> PathBuf {
        self.project_dir().join("config.yaml")
    }

    /// Resolve a configured path against the project root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Errors that can occur during project operations
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("not a lootdb project (searched from {searched_from:?}). Run 'lootdb init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("lootdb project already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_project_init_creates_structure() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();

        assert!(project.config_path().exists());
        assert!(project.root().join("templates/affixes").is_dir());
        assert!(project.root().join("templates/uniques").is_dir());
        assert!(project.root().join("templates/sets").is_dir());
        assert!(project.root().join("templates/colors.xml").exists());
        assert!(project.root().join("templates/sounds.xml").exists());
        assert!(project.root().join("templates/beams.xml").exists());
        assert!(project.root().join("overrides").is_dir());
    }

    #[test]
    fn test_project_init_fails_if_exists() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let err = Project::init(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::AlreadyExists(_)));
    }

    #[test]
    fn test_init_force_keeps_templates() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        let colors = project.root().join("templates/colors.xml");
        std::fs::write(&colors, "<ItemFilter><rules/></ItemFilter>").unwrap();

        Project::init_force(tmp.path()).unwrap();
        let content = std::fs::read_to_string(&colors).unwrap();
        assert_eq!(content, "<ItemFilter><rules/></ItemFilter>");
    }

    #[test]
    fn test_project_discover_finds_marker_dir() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let subdir = tmp.path().join("templates/affixes");
        let project = Project::discover_from(&subdir).unwrap();
        assert_eq!(
            project.root().canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_project_discover_fails_without_marker() {
        let tmp = tempdir().unwrap();
        let err = Project::discover_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::NotFound { .. }));
    }
}
