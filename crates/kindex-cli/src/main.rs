//! # kindex CLI entry point
//!
//! Parses command-line arguments, loads the engine and dispatches to
//! subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kindex_cli::catalog::{run_catalog, CatalogArgs};
use kindex_cli::collect::{run_collect, CollectArgs};
use kindex_cli::resolve::{run_resolve, ResolveArgs};
use kindex_cli::validate::{run_validate, ValidateArgs};
use kindex_cli::{Engine, EngineArgs};

/// kindex: schema-driven validation and reference integrity for
/// controller object snapshots.
#[derive(Parser, Debug)]
#[command(name = "kindex", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Summarize the catalog, or describe one kind.
    Catalog(CatalogArgs),

    /// Validate payload files as one kind.
    Validate(ValidateArgs),

    /// Build a snapshot from payload files and resolve its references.
    Resolve(ResolveArgs),

    /// Fetch a paginated collection from a snapshot directory.
    Collect(CollectArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let result = Engine::from_env(&cli.engine).and_then(|engine| {
        let as_json = cli.engine.json;
        match &cli.command {
            Commands::Catalog(args) => run_catalog(args, &engine, as_json),
            Commands::Validate(args) => run_validate(args, &engine, as_json),
            Commands::Resolve(args) => run_resolve(args, &engine, as_json),
            Commands::Collect(args) => run_collect(args, &engine, as_json),
        }
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
