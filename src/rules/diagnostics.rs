//! Rule file parse errors with source locations

use miette::{Diagnostic, NamedSource, SourceSpan};
use std::cell::OnceCell;
use std::sync::Arc;
use thiserror::Error;

/// Text of one rule file, shared by every diagnostic raised against it
///
/// The text is copied at most once, on the first error.
#[derive(Debug)]
pub struct RuleSource<'a> {
    filename: &'a str,
    text: &'a str,
    shared: OnceCell<Arc<str>>,
}

impl<'a> RuleSource<'a> {
    pub fn new(filename: &'a str, text: &'a str) -> Self {
        Self {
            filename,
            text,
            shared: OnceCell::new(),
        }
    }

    fn named(&self) -> NamedSource<Arc<str>> {
        let text = self.shared.get_or_init(|| Arc::from(self.text));
        NamedSource::new(self.filename, Arc::clone(text))
    }
}

/// A template file or rule that could not be parsed
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(lootdb::rules::parse))]
pub struct RuleParseError {
    #[source_code]
    src: NamedSource<Arc<str>>,

    #[label("{label}")]
    span: SourceSpan,

    label: String,

    #[help]
    help: Option<String>,

    message: String,
    line: usize,
    rule_index: Option<usize>,
}

impl RuleParseError {
    /// Error for a whole file (not well-formed, wrong structure)
    pub fn file(message: impl Into<String>, source: &RuleSource<'_>, offset: usize) -> Self {
        Self::build(message.into(), source, offset, None, "file skipped")
    }

    /// Error for a single rule; the rest of the file is still used
    pub fn rule(
        message: impl Into<String>,
        source: &RuleSource<'_>,
        offset: usize,
        rule_index: usize,
    ) -> Self {
        Self::build(message.into(), source, offset, Some(rule_index), "rule skipped")
    }

    fn build(
        message: String,
        source: &RuleSource<'_>,
        offset: usize,
        rule_index: Option<usize>,
        label: &str,
    ) -> Self {
        let text = source.text;
        let offset = offset.min(text.len());
        let len = if offset < text.len() { 1 } else { 0 };
        let help = generate_help(&message);
        Self {
            src: source.named(),
            span: SourceSpan::from(offset..offset + len),
            label: label.to_string(),
            help,
            line: offset_to_line(text, offset),
            message,
            rule_index,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 1-based line of the error
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn rule_index(&self) -> Option<usize> {
        self.rule_index
    }
}

/// Convert a byte offset to a 1-based line number
fn offset_to_line(source: &str, offset: usize) -> usize {
    source
        .bytes()
        .take(offset)
        .filter(|b| *b == b'\n')
        .count()
        + 1
}

/// Generate helpful suggestions based on error message
fn generate_help(message: &str) -> Option<String> {
    let msg_lower = message.to_lowercase();

    if msg_lower.contains("never closed") || msg_lower.contains("unexpected eof") {
        return Some("An element is missing its closing tag.".to_string());
    }

    if msg_lower.contains("mismatch") || msg_lower.contains("expecting") {
        return Some("Closing tags must match the most recently opened element.".to_string());
    }

    if msg_lower.contains("<rules>") {
        return Some("Template files must wrap their rules in a <rules> element.".to_string());
    }

    if msg_lower.contains("affix id") || msg_lower.contains("uniqueid") {
        return Some(
            "Filled rules take their id from the condition payload; check the condition block."
                .to_string(),
        );
    }

    if msg_lower.contains("not an integer") {
        return Some("Ids and codes must be non-negative whole numbers.".to_string());
    }

    None
}
