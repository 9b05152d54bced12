use clap::Parser;
use lootdb::cli::{Cli, Commands};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    let default_level = if global.verbose {
        "info"
    } else if global.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match cli.command {
        Commands::Init(args) => lootdb::cli::commands::init::run(args),
        Commands::Build(args) => lootdb::cli::commands::build::run(args, &global),
        Commands::Status(args) => lootdb::cli::commands::status::run(args, &global),
        Commands::Validate(args) => lootdb::cli::commands::validate::run(args, &global),
        Commands::Lookup(args) => lootdb::cli::commands::lookup::run(args, &global),
        Commands::Tags(args) => lootdb::cli::commands::tags::run(args, &global),
        Commands::Completions(args) => lootdb::cli::commands::completions::run(args),
    }
}
