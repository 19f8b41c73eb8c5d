//! Variant store main executable

pub mod adaptor;
pub mod chunks;
pub mod cli;
pub mod codec;
pub mod common;
pub mod err;
pub mod iterator;
pub mod model;
pub mod query;
pub mod registry;
pub mod storage;
pub mod writer;

use clap::{Parser, Subcommand};
use console::{Emoji, Term};

/// Name of the collection holding the merged variant documents.
pub const VARIANTS_COLLECTION: &str = "variants";
/// Name of the collection holding one summary per loaded file.
pub const FILES_COLLECTION: &str = "files";

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Genomic variant document store",
    long_about = "Loads variants of many files into one merged document per variant and \
                  answers region, gene and annotation queries"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Load variant files into the store.
    Load(cli::load::Args),
    /// Attach annotations to stored variants.
    Annotate(cli::annotate::Args),
    /// Query stored variants.
    Query(cli::query::Args),
    /// List loaded source files.
    Sources(cli::sources::Args),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Load(args) => cli::load::run(&cli.common, args)?,
            Commands::Annotate(args) => cli::annotate::run(&cli.common, args)?,
            Commands::Query(args) => cli::query::run(&cli.common, args)?,
            Commands::Sources(args) => cli::sources::run(&cli.common, args)?,
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}
