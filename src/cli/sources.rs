//! Implementation of the `sources` sub command.

use std::{io::Write, sync::Arc};

use crate::{
    adaptor::{SourceDbAdaptor, StudyDbAdaptor},
    common,
    query::{keys, QueryOptions},
    registry::SourceRegistry,
    FILES_COLLECTION,
};

/// Command line arguments for `sources` sub command.
#[derive(Debug, clap::Parser)]
#[command(about = "List the loaded source files", long_about = None)]
pub struct Args {
    /// Path to the RocksDB directory.
    #[arg(long)]
    pub path_db: String,
    /// Optional path to RocksDB WAL directory.
    #[arg(long)]
    pub path_wal_dir: Option<String>,
    /// Path to the output file, `-` for stdout.
    #[arg(long, default_value = "-")]
    pub path_output: String,
    /// Restrict to these studies.
    #[arg(long)]
    pub study_id: Vec<String>,
    /// Restrict to these files.
    #[arg(long)]
    pub file_id: Vec<String>,
    /// Only print the ordered sample names of each selected file.
    #[arg(long)]
    pub samples_only: bool,
    /// Print the studies with their number of files instead of the files.
    #[arg(long, conflicts_with = "samples_only")]
    pub studies: bool,
}

/// Write the studies given by `--study-id`, accepting names too, or all of them.
fn write_studies(
    adaptor: &StudyDbAdaptor,
    args: &Args,
    out: &mut dyn Write,
) -> Result<usize, anyhow::Error> {
    if args.study_id.is_empty() {
        let studies = adaptor.list_studies()?;
        for study in &studies.result {
            super::write_json_line(out, study)?;
        }
        return Ok(studies.result.len());
    }

    let mut written = 0;
    for study in &args.study_id {
        let found = adaptor.find_study_name_or_study_id(study)?;
        let Some(study_id) = found.result.first() else {
            tracing::warn!("Study {} not found", study);
            continue;
        };
        for summary in &adaptor.get_study_by_id(study_id)?.result {
            super::write_json_line(out, summary)?;
            written += 1;
        }
    }
    Ok(written)
}

fn write_sources(
    adaptor: &SourceDbAdaptor,
    args: &Args,
    out: &mut dyn Write,
) -> Result<usize, anyhow::Error> {
    if args.samples_only {
        let results = adaptor.get_samples_by_sources(&args.file_id)?;
        for (file_id, result) in args.file_id.iter().zip(&results) {
            if !result.warning_msg.is_empty() {
                tracing::warn!("{}", &result.warning_msg);
            }
            super::write_json_line(
                out,
                &serde_json::json!({ "file_id": file_id, "samples": &result.result }),
            )?;
        }
        return Ok(results.len());
    }

    let mut options = QueryOptions::new();
    if !args.study_id.is_empty() {
        options.put(keys::STUDY_ID, args.study_id.join(","));
    }
    if !args.file_id.is_empty() {
        options.put(keys::FILE_ID, args.file_id.join(","));
    }
    let sources = adaptor.get_all_sources(&options)?;
    for source in &sources.result {
        super::write_json_line(out, source)?;
    }
    Ok(sources.result.len())
}

/// Main entry point for `sources` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let store = super::open_store(&args.path_db, args.path_wal_dir.as_deref())?;
    let registry = Arc::new(SourceRegistry::new(store.clone(), FILES_COLLECTION));
    let adaptor = SourceDbAdaptor::new(store.clone(), FILES_COLLECTION, registry);
    tracing::info!("{} sources in store", adaptor.count_sources()?.result.iter().sum::<u64>());

    let mut out = super::open_output(&args.path_output)?;
    let written = if args.studies {
        write_studies(&StudyDbAdaptor::new(store, FILES_COLLECTION), args, &mut out)?
    } else {
        write_sources(&adaptor, args, &mut out)?
    };
    out.flush()?;
    tracing::info!("wrote {} records", written);

    Ok(())
}
