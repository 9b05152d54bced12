//! `lootdb init` command - Initialize a new project

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::Path;

use crate::core::identity::EntityKind;
use crate::core::project::{Project, ProjectError};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: std::path::PathBuf,

    /// Rewrite the project config even if .lootdb/ already exists
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).into_diagnostic()?;
        println!(
            "{} Created directory {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
    }

    let project = if args.force {
        Project::init_force(&path)
    } else {
        Project::init(&path)
    };

    match project {
        Ok(project) => {
            println!(
                "{} Initialized lootdb project at {}",
                style("✓").green(),
                style(project.root().display()).cyan()
            );
            println!();
            println!("Created project structure:");
            print_structure(project.root());
            println!();
            println!("Next steps:");
            println!(
                "  {} Drop rule templates into templates/<type>/",
                style("1.").dim()
            );
            println!(
                "  {} Build the database",
                style("lootdb build").yellow()
            );
            println!(
                "  {} Check templates and overrides without writing",
                style("lootdb validate").yellow()
            );
            Ok(())
        }
        Err(ProjectError::AlreadyExists(path)) => {
            println!(
                "{} lootdb project already exists at {}",
                style("!").yellow(),
                style(path.display()).cyan()
            );
            println!();
            println!(
                "Use {} to reinitialize",
                style("lootdb init --force").yellow()
            );
            Ok(())
        }
        Err(e) => Err(miette::miette!("{}", e)),
    }
}

fn print_structure(root: &Path) {
    println!("  {}/", style(".lootdb").blue());
    println!("    config.yaml");
    println!("  {}/", style("templates").blue());
    println!("    colors.xml, sounds.xml, beams.xml");
    for kind in EntityKind::all() {
        let marker = if root.join("templates").join(kind.default_directory()).is_dir() {
            ""
        } else {
            " (missing)"
        };
        println!("    {}/{}", style(kind.default_directory()).blue(), marker);
    }
    println!("  {}/", style("overrides").blue());
    for kind in EntityKind::all() {
        println!("    {} {}", kind.overrides_file(), style("(optional)").dim());
    }
}
