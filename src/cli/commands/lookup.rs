//! `lootdb lookup` command - One entry by type and id

use console::style;
use miette::Result;

use crate::cli::helpers::{load_context, print_structured};
use crate::cli::GlobalOpts;
use crate::core::identity::EntityKind;
use crate::db::reader::Database;

#[derive(clap::Args, Debug)]
pub struct LookupArgs {
    /// Entity type (affix, unique, set)
    pub kind: EntityKind,

    /// Numeric id
    pub id: u32,
}

pub fn run(args: LookupArgs, global: &GlobalOpts) -> Result<()> {
    let (_project, _config, paths) = load_context(global)?;
    let db = Database::open(&paths.output)?;

    let Some(record) = db.record(args.kind, args.id) else {
        return Err(miette::miette!(
            "no {} with id {} in the database",
            args.kind,
            args.id
        ));
    };

    if print_structured(record, global.format)? {
        return Ok(());
    }

    let name = match &record.name {
        Some(name) => style(name.clone()).cyan().to_string(),
        None => style("(not yet discovered)".to_string()).yellow().to_string(),
    };
    println!("{} {}: {}", args.kind.label(), record.id, name);
    println!("  Provenance: {}", record.provenance);
    if let Some(description) = &record.description {
        println!("  Description: {}", description);
    }
    for (key, value) in &record.properties {
        println!("  {}: {}", key, value);
    }
    for note in &record.notes {
        println!("  {} {}", style("note:").dim(), note);
    }
    Ok(())
}
