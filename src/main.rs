//! epictrack CLI entry point.

use clap::Parser;
use epictrack::cli::commands::{self, Workspace};
use epictrack::cli::{Cli, Commands};
use epictrack::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,hyper=info,reqwest=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    match &cli.command {
        Commands::Version => commands::version::execute(json),
        Commands::Completions { shell } => commands::completions::execute(shell),

        Commands::Status => commands::status::execute(&Workspace::open(cli)?, json),
        Commands::Epic { command } => {
            commands::epic::execute(command, &Workspace::open(cli)?, json)
        }
        Commands::Journey { command } => {
            commands::journey::execute(command, &Workspace::open(cli)?, json)
        }
        Commands::Sync { epic } => commands::sync::execute(*epic, &Workspace::open(cli)?, json),
        Commands::Detect { command } => {
            commands::detect::execute(command, &Workspace::open(cli)?, json)
        }
        Commands::Reconcile { epic } => {
            commands::reconcile::execute(*epic, &Workspace::open(cli)?, json)
        }
    }
}
