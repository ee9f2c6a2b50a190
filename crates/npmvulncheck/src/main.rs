use anyhow::Result;
use clap::Parser;
use npmvulncheck::cli::{Cli, Commands};
use npmvulncheck::commands::{handle_fix, handle_plan, handle_scan};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("[npmvulncheck] error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Scan(args) => handle_scan(args),
        Commands::Plan(args) => handle_plan(args),
        Commands::Fix(args) => handle_fix(args),
    }
}
