//! Implementation of the `load` sub command.

use std::{
    io::BufRead,
    sync::{atomic::AtomicBool, Arc},
};

use rayon::prelude::*;
use thousands::Separable;

use crate::{
    codec::IncludeSrc,
    common::{self, expand_path_args, io::open_read_maybe_gz},
    model::{Variant, VariantSource},
    storage::{DocumentStore, RocksStore},
    writer::{BulkMergeWriter, WriterConfig, WriterConfigBuilder, WriterStats},
};

/// Command line arguments for `load` sub command.
#[derive(Debug, clap::Parser)]
#[command(about = "Load variants from JSON lines files", long_about = None)]
pub struct Args {
    /// Path to the RocksDB directory.
    #[arg(long)]
    pub path_db: String,
    /// Optional path to RocksDB WAL directory.
    #[arg(long)]
    pub path_wal_dir: Option<String>,
    /// Input files; the first line is the source, each further line a variant.  Prefix
    /// with `@` to read line-wise paths from a file.
    #[arg(long, required = true)]
    pub path_input: Vec<String>,

    /// How much of the original source line to store.
    #[arg(long, value_enum, default_value_t = IncludeSrc::No)]
    pub include_src: IncludeSrc,
    /// Do not store per-sample genotypes.
    #[arg(long)]
    pub no_samples: bool,
    /// Do not store cohort stats.
    #[arg(long)]
    pub no_stats: bool,
    /// List the samples of every genotype instead of collapsing the default one.
    #[arg(long)]
    pub no_compress_default_genotype: bool,
    /// Genotype to collapse, the most common one if unset.
    #[arg(long)]
    pub default_genotype: Option<String>,
    /// Number of updates per bulk write.
    #[arg(long, default_value_t = 100)]
    pub bulk_size: usize,
    /// Number of variants handed to the writer at once.
    #[arg(long, default_value_t = 1000)]
    pub batch_size: usize,
    /// Set the number of threads to use, defaults to number of cores.
    #[arg(long)]
    pub num_threads: Option<usize>,
}

impl Args {
    fn writer_config(&self) -> Result<WriterConfig, anyhow::Error> {
        WriterConfigBuilder::default()
            .include_samples(!self.no_samples)
            .include_stats(!self.no_stats)
            .include_src(self.include_src)
            .compress_default_genotype(!self.no_compress_default_genotype)
            .default_genotype(self.default_genotype.clone())
            .bulk_size(self.bulk_size)
            .build()
            .map_err(|e| anyhow::anyhow!("invalid writer configuration: {}", e))
    }
}

/// Load one input file through its own writer.
pub(crate) fn load_file(
    store: Arc<dyn DocumentStore>,
    path: &str,
    config: WriterConfig,
    batch_size: usize,
) -> Result<WriterStats, anyhow::Error> {
    let before = std::time::Instant::now();
    let reader = open_read_maybe_gz(path)
        .map_err(|e| anyhow::anyhow!("could not open file {} for reading: {}", path, e))?;
    let mut lines = reader.lines().enumerate().filter(|(_, line)| match line {
        Ok(line) => !line.trim().is_empty(),
        Err(_) => true,
    });

    let source: VariantSource = match lines.next() {
        Some((_, line)) => serde_json::from_str(&line?)
            .map_err(|e| anyhow::anyhow!("problem parsing source in {}: {}", path, e))?,
        None => anyhow::bail!("file {} is empty", path),
    };
    tracing::debug!("loading file {} of study {}", &source.file_id, &source.study_id);

    // one latch per source file; the writers of different files each store their summary
    let summary_written = Arc::new(AtomicBool::new(false));
    let mut writer = BulkMergeWriter::new(store, source, config, summary_written);
    writer.open()?;
    writer.pre()?;
    let mut batch = Vec::with_capacity(batch_size);
    for (no, line) in lines {
        let variant: Variant = serde_json::from_str(&line?)
            .map_err(|e| anyhow::anyhow!("problem parsing variant at {}:{}: {}", path, no + 1, e))?;
        batch.push(variant);
        if batch.len() >= batch_size {
            writer.write(&batch)?;
            batch.clear();
        }
    }
    writer.write(&batch)?;
    writer.post()?;
    writer.close()?;

    let stats = writer.stats();
    tracing::info!(
        "loaded {} variants from {} in {:?}",
        stats.variants.separate_with_commas(),
        path,
        before.elapsed()
    );
    Ok(stats)
}

/// Main entry point for `load` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = std::time::Instant::now();
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    if let Some(num_threads) = args.num_threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| anyhow::anyhow!("building global Rayon thread pool failed: {}", e))?;
    }

    let path_input = expand_path_args(&args.path_input)?;
    let config = args.writer_config()?;
    common::trace_rss_now();

    // scope for the transaction database
    {
        let store = super::open_store(&args.path_db, args.path_wal_dir.as_deref())?;

        tracing::info!("Loading {} files ...", path_input.len());
        let before_load = std::time::Instant::now();
        let stats = path_input
            .par_iter()
            .map(|path| {
                load_file(
                    store.clone(),
                    path,
                    config.clone(),
                    args.batch_size.max(1),
                )
                .map_err(|e| anyhow::anyhow!("loading file {} failed: {}", path, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let dropped = stats.iter().map(|s| s.dropped).sum::<u64>();
        if dropped > 0 {
            tracing::warn!("{} updates were dropped with failed batches", dropped);
        }
        tracing::info!("... done loading files in {:?}", before_load.elapsed());

        tracing::info!("Waiting for index builds ...");
        store.wait_for_index_builds()?;
        common::trace_rss_now();
    }

    // scope for cleanup
    {
        tracing::info!("Running RocksDB compaction ...");
        let before_compaction = std::time::Instant::now();
        RocksStore::compact(&args.path_db, super::COLLECTIONS)?;
        tracing::info!(
            "... done compacting RocksDB in {:?}",
            before_compaction.elapsed()
        );
    }

    tracing::info!(
        "All of `load` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}
