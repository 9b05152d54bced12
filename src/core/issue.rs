//! Build issues collected across pipeline stages
//!
//! Stage-local problems are never thrown; they are pushed onto an
//! [`IssueList`] and surface in the build log and summary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::core::identity::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Classification of an issue, used for summary counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    DuplicateName,
    AmbiguousName,
    UnmatchedOverride,
    UnmatchedCorrection,
    CorrectionNoOp,
    CorrectionMismatch,
    ConflictingRule,
    LabelPayloadMismatch,
    ParseError,
    OverrideFormat,
    MissingDirectory,
    IndexDegraded,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::DuplicateName => "duplicate-name",
            IssueKind::AmbiguousName => "ambiguous-name",
            IssueKind::UnmatchedOverride => "unmatched-override",
            IssueKind::UnmatchedCorrection => "unmatched-correction",
            IssueKind::CorrectionNoOp => "correction-no-op",
            IssueKind::CorrectionMismatch => "correction-mismatch",
            IssueKind::ConflictingRule => "conflicting-rule",
            IssueKind::LabelPayloadMismatch => "label-payload-mismatch",
            IssueKind::ParseError => "parse-error",
            IssueKind::OverrideFormat => "override-format",
            IssueKind::MissingDirectory => "missing-directory",
            IssueKind::IndexDegraded => "index-degraded",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A warning or error found while building
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub kind: IssueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_index: Option<usize>,
    pub message: String,
}

impl ValidationIssue {
    pub fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, kind, message)
    }

    pub fn error(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, kind, message)
    }

    fn new(severity: Severity, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            entity: None,
            ids: Vec::new(),
            source: None,
            rule_index: None,
            message: message.into(),
        }
    }

    pub fn for_entity(mut self, kind: EntityKind) -> Self {
        self.entity = Some(kind);
        self
    }

    pub fn with_ids(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.ids = ids.into_iter().collect();
        self
    }

    pub fn in_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn at_rule(mut self, index: usize) -> Self {
        self.rule_index = Some(index);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl ValidationIssue {
    /// Everything but the leading severity
    pub fn detail(&self) -> IssueDetail<'_> {
        IssueDetail(self)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.severity, self.detail())
    }
}

/// Display form of an issue without its severity
pub struct IssueDetail<'a>(&'a ValidationIssue);

impl fmt::Display for IssueDetail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let issue = self.0;
        write!(f, "{}", issue.kind)?;
        if let Some(entity) = issue.entity {
            write!(f, " {}", entity)?;
        }
        if !issue.ids.is_empty() {
            let ids: Vec<String> = issue.ids.iter().map(|id| id.to_string()).collect();
            write!(f, " [{}]", ids.join(","))?;
        }
        if let Some(source) = &issue.source {
            write!(f, " {}", source.display())?;
            if let Some(index) = issue.rule_index {
                write!(f, "#rule{}", index)?;
            }
        }
        write!(f, ": {}", issue.message)
    }
}

/// Running list of issues for one build
#[derive(Debug, Clone, Default)]
pub struct IssueList {
    issues: Vec<ValidationIssue>,
}

impl IssueList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        match issue.severity {
            Severity::Warning => tracing::warn!(kind = %issue.kind, "{}", issue),
            Severity::Error => tracing::error!(kind = %issue.kind, "{}", issue),
        }
        self.issues.push(issue);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn errors(&self) -> usize {
        self.issues.iter().filter(|i| i.is_error()).count()
    }

    pub fn warnings(&self) -> usize {
        self.issues.len() - self.errors()
    }

    pub fn count_kind(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display() {
        let issue = ValidationIssue::warning(IssueKind::DuplicateName, "'Health' used twice")
            .for_entity(EntityKind::Affix)
            .with_ids([100, 200]);
        assert_eq!(
            issue.to_string(),
            "WARN duplicate-name affix [100,200]: 'Health' used twice"
        );
        assert_eq!(
            issue.detail().to_string(),
            "duplicate-name affix [100,200]: 'Health' used twice"
        );
    }

    #[test]
    fn test_issue_list_counts() {
        let mut list = IssueList::new();
        list.push(ValidationIssue::warning(IssueKind::AmbiguousName, "a"));
        list.push(ValidationIssue::error(IssueKind::ParseError, "b").in_file("x.xml").at_rule(2));
        assert_eq!(list.len(), 2);
        assert_eq!(list.errors(), 1);
        assert_eq!(list.warnings(), 1);
        assert_eq!(list.count_kind(IssueKind::ParseError), 1);
    }
}
