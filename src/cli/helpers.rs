//! Shared helper functions for CLI commands

use console::style;
use miette::Result;
use serde::Serialize;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::config::Config;
use crate::core::issue::{Severity, ValidationIssue};
use crate::core::project::Project;
use crate::db::build::BuildPaths;

/// Open the project named by `--project`, or discover it from the current directory
pub fn open_project(global: &GlobalOpts) -> Result<Project> {
    let project = match &global.project {
        Some(root) => Project::at(root),
        None => Project::discover(),
    };
    project.map_err(|e| miette::miette!("{}", e))
}

/// Project plus its resolved configuration and build paths
pub fn load_context(global: &GlobalOpts) -> Result<(Project, Config, BuildPaths)> {
    let project = open_project(global)?;
    let config = Config::load(&project)?;
    let paths = BuildPaths::for_project(&project, &config);
    Ok((project, config, paths))
}

/// Truncate a string to max_len, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// One issue line, colored by severity
pub fn format_issue(issue: &ValidationIssue) -> String {
    let text = issue.to_string();
    match issue.severity {
        Severity::Warning => format!("  {} {}", style("!").yellow(), style(text).yellow()),
        Severity::Error => format!("  {} {}", style("✗").red(), style(text).red()),
    }
}

/// Print a value as YAML or JSON; returns false for human output
pub fn print_structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)
                .map_err(|e| miette::miette!("JSON serialization error: {}", e))?;
            println!("{}", json);
            Ok(true)
        }
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(value)
                .map_err(|e| miette::miette!("YAML serialization error: {}", e))?;
            print!("{}", yaml);
            Ok(true)
        }
        OutputFormat::Auto => Ok(false),
    }
}
