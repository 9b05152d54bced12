//! CLI command implementations

pub mod build;
pub mod completions;
pub mod init;
pub mod lookup;
pub mod status;
pub mod tags;
pub mod validate;
