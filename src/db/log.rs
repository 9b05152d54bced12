//! Build log and human-readable build summary

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt;
use tabled::{builder::Builder, settings::Style};

use crate::core::identity::EntityKind;
use crate::core::issue::{IssueKind, IssueList, Severity, ValidationIssue};
use crate::db::snapshot::SnapshotMetadata;

pub const LOG_FILE: &str = "build.log";
pub const SUMMARY_FILE: &str = "BUILD_SUMMARY.md";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO "),
            LogLevel::Warn => write!(f, "WARN "),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Timestamped record of one build: stage transitions and every issue
#[derive(Debug, Default)]
pub struct BuildLog {
    entries: Vec<LogEntry>,
    issues: IssueList,
}

impl BuildLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.entries.push(LogEntry {
            at: Utc::now(),
            level: LogLevel::Info,
            message,
        });
    }

    pub fn issue(&mut self, issue: ValidationIssue) {
        let level = match issue.severity {
            Severity::Warning => LogLevel::Warn,
            Severity::Error => LogLevel::Error,
        };
        self.entries.push(LogEntry {
            at: Utc::now(),
            level,
            message: issue.detail().to_string(),
        });
        self.issues.push(issue);
    }

    pub fn issues_from(&mut self, issues: impl IntoIterator<Item = ValidationIssue>) {
        for issue in issues {
            self.issue(issue);
        }
    }

    pub fn issues(&self) -> &IssueList {
        &self.issues
    }

    pub fn into_issues(self) -> IssueList {
        self.issues
    }

    /// One line per entry
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!(
                "{} {} {}\n",
                entry.at.to_rfc3339_opts(SecondsFormat::Millis, true),
                entry.level,
                entry.message
            ));
        }
        out
    }
}

/// Per-type row of the summary table
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeRow {
    pub files: usize,
    pub files_failed: usize,
    pub overrides: usize,
    pub corrections: usize,
}

/// Everything the build summary reports
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub metadata: SnapshotMetadata,
    pub rows: BTreeMap<EntityKind, TypeRow>,
    pub issue_limit: usize,
}

impl BuildSummary {
    pub fn files_processed(&self) -> usize {
        self.rows.values().map(|r| r.files).sum()
    }

    pub fn files_failed(&self) -> usize {
        self.rows.values().map(|r| r.files_failed).sum()
    }

    /// Markdown summary with the first few issues inline
    pub fn render(&self, issues: &IssueList) -> String {
        let meta = &self.metadata;
        let mut output = String::new();
        output.push_str("# Database Build Summary\n\n");
        output.push_str(&format!("- **Content version:** {}\n", meta.content_version));
        output.push_str(&format!(
            "- **Built:** {}\n",
            self.finished.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        output.push_str(&format!(
            "- **Duration:** {} ms\n",
            (self.finished - self.started).num_milliseconds()
        ));
        output.push_str(&format!(
            "- **Newest source:** {}\n\n",
            meta.source_timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));

        let mut builder = Builder::default();
        builder.push_record([
            "Type",
            "Files",
            "Failed",
            "Entries",
            "Discovered",
            "Missing",
            "Overrides",
            "Corrections",
        ]);
        for (kind, counts) in &meta.counts {
            let row = self.rows.get(kind).copied().unwrap_or_default();
            builder.push_record([
                kind.plural().to_string(),
                row.files.to_string(),
                row.files_failed.to_string(),
                counts.total.to_string(),
                counts.discovered.to_string(),
                counts.missing.to_string(),
                row.overrides.to_string(),
                row.corrections.to_string(),
            ]);
        }
        output.push_str(&builder.build().with(Style::markdown()).to_string());
        output.push('\n');

        if !meta.inactive_types.is_empty() {
            let names: Vec<_> = meta.inactive_types.iter().map(|k| k.plural()).collect();
            output.push_str(&format!("\nInactive types: {}\n", names.join(", ")));
        }

        output.push_str("\n## Totals\n\n");
        output.push_str(&format!(
            "- **Files processed:** {} ({} failed)\n",
            self.files_processed(),
            self.files_failed()
        ));
        output.push_str(&format!("- **Overrides applied:** {}\n", meta.overrides_applied));
        output.push_str(&format!("- **Corrections applied:** {}\n", meta.corrections_applied));
        output.push_str(&format!(
            "- **Duplicate names:** {}\n",
            issues.count_kind(IssueKind::DuplicateName)
        ));
        output.push_str(&format!("- **Warnings:** {}\n", issues.warnings()));
        output.push_str(&format!("- **Errors:** {}\n", issues.errors()));

        if !issues.is_empty() {
            output.push_str("\n## Issues\n\n");
            for issue in issues.iter().take(self.issue_limit) {
                output.push_str(&format!("- {}\n", issue));
            }
            if issues.len() > self.issue_limit {
                output.push_str(&format!(
                    "\n{} more in {}\n",
                    issues.len() - self.issue_limit,
                    LOG_FILE
                ));
            }
        }

        output
    }
}
