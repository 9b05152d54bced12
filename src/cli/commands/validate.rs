//! `lootdb validate` command - Check templates and curation files without writing

use console::style;
use miette::Result;

use crate::cli::helpers::{format_issue, load_context};
use crate::cli::GlobalOpts;
use crate::core::issue::IssueKind;
use crate::db::build::{assemble_database, BuildInputs};
use crate::db::log::BuildLog;

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Strict mode - any issue fails the command
    #[arg(long)]
    pub strict: bool,

    /// Show summary only, don't show individual issues
    #[arg(long)]
    pub summary: bool,
}

pub fn run(args: ValidateArgs, global: &GlobalOpts) -> Result<()> {
    let (_project, config, paths) = load_context(global)?;
    let inputs = BuildInputs::collect(&config, &paths)?;

    let mut log = BuildLog::new();
    let assembly = assemble_database(&config, &paths, &inputs, &mut log);
    let issues = log.into_issues();

    if !args.summary && !global.quiet {
        for diagnostic in assembly.diagnostics {
            let report = miette::Report::new(diagnostic);
            println!("{:?}", report);
        }
        for issue in issues.iter().filter(|i| i.kind != IssueKind::ParseError) {
            println!("{}", format_issue(issue));
        }
    }

    if !global.quiet {
        println!();
        println!("{}", style("─".repeat(60)).dim());
        println!("{}", style("Validation Summary").bold());
        println!("{}", style("─".repeat(60)).dim());
        println!(
            "  Template files:  {}",
            style(inputs.corpus.template_count()).cyan()
        );
        for (kind, counts) in &assembly.snapshot.metadata.counts {
            println!(
                "  {:<16} {} ({} missing)",
                format!("{}:", kind.plural()),
                style(counts.total).cyan(),
                counts.missing
            );
        }
        println!(
            "  Duplicate names: {}",
            style(issues.count_kind(IssueKind::DuplicateName)).yellow()
        );
        println!("  Warnings:        {}", style(issues.warnings()).yellow());
        println!("  Errors:          {}", style(issues.errors()).red());
        println!();
    }

    if args.strict && !issues.is_empty() {
        return Err(miette::miette!(
            "Validation failed: {} issue(s) in strict mode",
            issues.len()
        ));
    }

    if issues.is_empty() && !global.quiet {
        println!("{} No issues found", style("✓").green().bold());
    }
    Ok(())
}
