//! `lootdb tags` command - Entries carrying a tag

use console::style;
use miette::Result;

use crate::cli::helpers::{load_context, print_structured, truncate_str};
use crate::cli::GlobalOpts;
use crate::db::reader::Database;

#[derive(clap::Args, Debug)]
pub struct TagsArgs {
    /// Tag, or a declared pair written as `a+b`
    pub tag: String,
}

pub fn run(args: TagsArgs, global: &GlobalOpts) -> Result<()> {
    let (_project, _config, paths) = load_context(global)?;
    let db = Database::open(&paths.output)?;

    if !db.has_tag_index() {
        return Err(miette::miette!(
            "tag index unavailable; check build.log for index errors"
        ));
    }
    let Some(tagged) = db.tagged(&args.tag) else {
        if !global.quiet {
            println!("{} No entries tagged '{}'", style("!").yellow(), args.tag);
        }
        return Ok(());
    };

    if print_structured(tagged, global.format)? {
        return Ok(());
    }

    for (kind, ids) in tagged {
        println!("{} ({})", style(kind.plural()).bold(), ids.len());
        for id in ids {
            let name = db.name(*kind, *id).unwrap_or("");
            println!("  {:>8}  {}", id, truncate_str(name, 60));
        }
    }
    Ok(())
}
