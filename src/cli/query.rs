//! Implementation of the `query` sub command.

use std::{io::Write, sync::Arc};

use thousands::Separable;

use crate::{
    adaptor::VariantDbAdaptor,
    common,
    query::{keys, QueryOptions},
    registry::SourceRegistry,
    FILES_COLLECTION, VARIANTS_COLLECTION,
};

/// Command line arguments for `query` sub command.
#[derive(Debug, clap::Parser)]
#[command(about = "Query stored variants", long_about = None)]
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

    /// Query parameter as `key=value`, e.g., `maf=<0.01`; may be repeated.
    #[arg(long = "opt")]
    pub opts: Vec<String>,
    /// Region as `chr:start-end` or `chr`; may be repeated.
    #[arg(long)]
    pub region: Vec<String>,
    /// Gene name or identifier; may be repeated.
    #[arg(long)]
    pub gene: Vec<String>,
    /// Variant id or cross-reference; may be repeated.
    #[arg(long)]
    pub id: Vec<String>,
    /// Count variants per `gene`, `ensemblGene` or `ct` instead of listing them.
    #[arg(long)]
    pub group_by: Option<String>,
    /// Only write the number of matching variants.
    #[arg(long)]
    pub count_only: bool,
}

impl Args {
    /// Query options from `--opt` pairs and the shorthand flags.
    fn query_options(&self) -> Result<QueryOptions, anyhow::Error> {
        let mut options = QueryOptions::from_pairs(&self.opts)
            .map_err(|e| anyhow::anyhow!("problem parsing query options: {}", e))?;
        for (key, values) in [
            (keys::REGION, &self.region),
            (keys::GENE, &self.gene),
            (keys::ID, &self.id),
        ] {
            if !values.is_empty() {
                let mut list = options.get_list(key);
                list.extend(values.iter().cloned());
                options.put(key, list.join(","));
            }
        }
        Ok(options)
    }
}

/// Run the query selected by `args` and write JSON lines to `out`; returns the
/// number of lines written.
fn write_results(
    adaptor: &VariantDbAdaptor,
    args: &Args,
    out: &mut dyn Write,
) -> Result<usize, anyhow::Error> {
    let options = args.query_options()?;
    tracing::debug!("query options = {:?}", &options);

    if args.count_only {
        let count = adaptor.count(&options)?;
        super::write_json_line(out, &serde_json::json!({ "count": count }))?;
        return Ok(1);
    }

    if let Some(field) = &args.group_by {
        let groups = adaptor.group_by(field, &options)?;
        for group in &groups.result {
            super::write_json_line(out, group)?;
        }
        return Ok(groups.result.len());
    }

    let mut iter = adaptor.iterator(&options)?;
    let mut written = 0;
    for variant in iter.by_ref() {
        super::write_json_line(out, &variant?)?;
        written += 1;
    }
    tracing::debug!(
        "spent {:?} fetching and {:?} converting",
        iter.time_fetching(),
        iter.time_converting()
    );
    Ok(written)
}

/// Main entry point for `query` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let store = super::open_store(&args.path_db, args.path_wal_dir.as_deref())?;
    let registry = Arc::new(SourceRegistry::new(store.clone(), FILES_COLLECTION));
    let adaptor = VariantDbAdaptor::new(store, VARIANTS_COLLECTION, registry);

    tracing::info!("Running query ...");
    let before_query = std::time::Instant::now();
    let mut out = super::open_output(&args.path_output)?;
    let written = write_results(&adaptor, args, &mut out)?;
    out.flush()?;
    tracing::info!(
        "... wrote {} records in {:?}",
        written.separate_with_commas(),
        before_query.elapsed()
    );

    Ok(())
}
