//! Template rule files - XML reading, extraction and diagnostics

pub mod diagnostics;
pub mod extract;
pub mod xml;

pub use diagnostics::RuleParseError;
pub use extract::{
    extract_entity_file, extract_files, extract_reference_file, looks_like_placeholder, parse_issue,
    placeholder_id, reduce, Candidate, FileExtraction, ReferenceExtraction, RuleOutcome,
};
