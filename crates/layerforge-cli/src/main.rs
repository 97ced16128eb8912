use clap::Parser;
use tracing_subscriber::EnvFilter;

mod args;
mod commands;
mod manifest;

use args::{Cli, Command};

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Generate(args) => commands::generate::run(&cli, args),
        Command::Check(args) => commands::check::run(&cli, args),
        Command::Preview(args) => commands::preview::run(&cli, args),
    };

    if let Err(err) = result {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
