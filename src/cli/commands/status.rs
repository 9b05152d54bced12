//! `lootdb status` command - Snapshot header and counts

use console::style;
use miette::Result;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{load_context, print_structured};
use crate::cli::GlobalOpts;
use crate::db::build::BuildInputs;
use crate::db::reader::Database;

#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    /// Also check whether sources changed since the snapshot was built
    #[arg(long)]
    pub check: bool,
}

pub fn run(args: StatusArgs, global: &GlobalOpts) -> Result<()> {
    let (_project, config, paths) = load_context(global)?;
    let db = Database::open(&paths.output)?;
    let meta = db.metadata();

    if print_structured(meta, global.format)? {
        return Ok(());
    }

    println!("{}", style("Database Status").bold().underlined());
    println!();
    println!("  Snapshot:        {}", style(paths.snapshot_file().display()).cyan());
    println!("  Content version: {}", style(&meta.content_version).cyan());
    println!("  Format version:  {}", meta.format_version);
    println!(
        "  Newest source:   {}",
        meta.source_timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  Overrides: {}  Corrections: {}",
        meta.overrides_applied, meta.corrections_applied
    );
    println!();

    let mut builder = Builder::default();
    builder.push_record(["Type", "Entries", "Discovered", "Missing"]);
    for (kind, counts) in &meta.counts {
        builder.push_record([
            kind.plural().to_string(),
            counts.total.to_string(),
            counts.discovered.to_string(),
            counts.missing.to_string(),
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()));

    if !meta.inactive_types.is_empty() {
        let names: Vec<_> = meta.inactive_types.iter().map(|k| k.plural()).collect();
        println!("  Inactive: {}", names.join(", "));
    }

    if args.check {
        let inputs = BuildInputs::collect(&config, &paths)?;
        let stale = inputs.digest() != meta.sources_digest
            || inputs.newest_mtime() > meta.source_timestamp;
        println!();
        if stale {
            println!(
                "{} Sources changed since this snapshot; run {}",
                style("!").yellow(),
                style("lootdb build").yellow()
            );
        } else {
            println!("{} Snapshot is current", style("✓").green());
        }
    }

    Ok(())
}
