//! `lootdb build` command - Assemble the database

use console::style;
use miette::Result;

use crate::cli::helpers::{format_issue, load_context};
use crate::cli::GlobalOpts;
use crate::db::build::{BuildOutcome, BuildRequest, Orchestrator};
use crate::db::log::{LOG_FILE, SUMMARY_FILE};

#[derive(clap::Args, Debug)]
pub struct BuildArgs {
    /// Rebuild even if the snapshot is newer than every source
    #[arg(long)]
    pub force: bool,
}

/// Issues printed inline before pointing at the log
const INLINE_ISSUES: usize = 5;

pub fn run(args: BuildArgs, global: &GlobalOpts) -> Result<()> {
    let (_project, config, paths) = load_context(global)?;

    let mut orchestrator = Orchestrator::new(config, paths);
    match orchestrator.run(BuildRequest { force: args.force }) {
        BuildOutcome::Skipped(skip) => {
            if !global.quiet {
                println!(
                    "{} Database is up to date ({})",
                    style("✓").green(),
                    style(skip.snapshot.display()).cyan()
                );
                println!(
                    "  Newest source {}; use {} to rebuild anyway",
                    skip.newest_source.format("%Y-%m-%d %H:%M:%S"),
                    style("lootdb build --force").yellow()
                );
            }
            Ok(())
        }
        BuildOutcome::Done(report) => {
            if global.quiet {
                return Ok(());
            }
            let meta = &report.snapshot.metadata;
            println!(
                "{} Built database {} at {}",
                style("✓").green(),
                style(&meta.content_version).cyan(),
                style(report.output.display()).cyan()
            );
            for (kind, counts) in &meta.counts {
                println!(
                    "  {:<8} {:>6} entries  {:>6} discovered  {:>6} missing",
                    kind.plural(),
                    counts.total,
                    style(counts.discovered).green(),
                    style(counts.missing).yellow()
                );
            }
            println!(
                "  Files processed: {} ({} failed)",
                report.summary.files_processed(),
                report.summary.files_failed()
            );
            println!(
                "  Overrides applied: {}, corrections applied: {}",
                meta.overrides_applied, meta.corrections_applied
            );

            if !report.issues.is_empty() {
                println!();
                println!(
                    "{} warning(s), {} error(s)",
                    style(report.issues.warnings()).yellow(),
                    style(report.issues.errors()).red()
                );
                for issue in report.issues.iter().take(INLINE_ISSUES) {
                    println!("{}", format_issue(issue));
                }
                if report.issues.len() > INLINE_ISSUES {
                    println!(
                        "  ... {} more in {}",
                        report.issues.len() - INLINE_ISSUES,
                        LOG_FILE
                    );
                }
            }
            println!();
            println!("See {} for details.", style(SUMMARY_FILE).cyan());
            Ok(())
        }
        BuildOutcome::Failed(error) => Err(error.into()),
    }
}
