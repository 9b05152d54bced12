//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    build::BuildArgs, completions::CompletionsArgs, init::InitArgs, lookup::LookupArgs,
    status::StatusArgs, tags::TagsArgs, validate::ValidateArgs,
};

#[derive(Parser)]
#[command(name = "lootdb")]
#[command(author, version, about = "Loot filter template database builder")]
#[command(long_about = "Assembles loot filter rule templates, override files and correction files into a versioned database snapshot with lookup indexes.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (default: auto-detect by finding .lootdb/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new lootdb project
    Init(InitArgs),

    /// Build the database snapshot and indexes
    Build(BuildArgs),

    /// Show the current snapshot header and counts
    Status(StatusArgs),

    /// Run extraction, merge and validation without writing anything
    Validate(ValidateArgs),

    /// Look up one entry by type and id
    Lookup(LookupArgs),

    /// List entries carrying a tag
    Tags(TagsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// JSON format (for programming)
    Json,
}
