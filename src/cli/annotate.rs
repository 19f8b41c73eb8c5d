//! Implementation of the `annotate` sub command.

use std::{io::BufRead, sync::Arc};

use thousands::Separable;

use crate::{
    adaptor::VariantDbAdaptor,
    common::{self, io::open_read_maybe_gz},
    model::VariantAnnotation,
    registry::SourceRegistry,
    storage::WriteResult,
    FILES_COLLECTION, VARIANTS_COLLECTION,
};

/// Command line arguments for `annotate` sub command.
#[derive(Debug, clap::Parser)]
#[command(about = "Attach annotations to stored variants", long_about = None)]
pub struct Args {
    /// Path to the RocksDB directory.
    #[arg(long)]
    pub path_db: String,
    /// Optional path to RocksDB WAL directory.
    #[arg(long)]
    pub path_wal_dir: Option<String>,
    /// Path to the annotations, one JSON object per line, optionally gzipped.
    #[arg(long)]
    pub path_input: String,
    /// Number of annotations per bulk update.
    #[arg(long, default_value_t = 1000)]
    pub batch_size: usize,
}

/// Apply the annotations read from `reader` in batches of `batch_size`.
pub(crate) fn annotate_from_reader(
    adaptor: &VariantDbAdaptor,
    reader: impl BufRead,
    batch_size: usize,
) -> Result<WriteResult, anyhow::Error> {
    let mut total = WriteResult::default();
    let mut failed = 0usize;
    let mut batch = Vec::with_capacity(batch_size);
    let mut flush = |batch: &mut Vec<VariantAnnotation>| {
        let result = adaptor.update_annotations(batch);
        if !result.error_msg.is_empty() {
            failed += batch.len();
        }
        for write in result.result {
            total += write;
        }
        batch.clear();
    };

    for (no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let annotation: VariantAnnotation = serde_json::from_str(&line)
            .map_err(|e| anyhow::anyhow!("problem parsing annotation in line {}: {}", no + 1, e))?;
        batch.push(annotation);
        if batch.len() >= batch_size {
            flush(&mut batch);
        }
    }
    if !batch.is_empty() {
        flush(&mut batch);
    }

    if failed > 0 {
        tracing::warn!("{} annotations were not written", failed);
    }
    Ok(total)
}

/// Main entry point for `annotate` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let store = super::open_store(&args.path_db, args.path_wal_dir.as_deref())?;
    let registry = Arc::new(SourceRegistry::new(store.clone(), FILES_COLLECTION));
    let adaptor = VariantDbAdaptor::new(store, VARIANTS_COLLECTION, registry);

    tracing::info!("Annotating variants from {} ...", &args.path_input);
    let before_annotate = std::time::Instant::now();
    let reader = open_read_maybe_gz(&args.path_input)
        .map_err(|e| anyhow::anyhow!("could not open {} for reading: {}", &args.path_input, e))?;
    let result = annotate_from_reader(&adaptor, reader, args.batch_size.max(1))?;
    tracing::info!(
        "... annotated {} of {} matching variants in {:?}",
        result.modified.separate_with_commas(),
        result.matched.separate_with_commas(),
        before_annotate.elapsed()
    );

    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        query::QueryOptions,
        storage::MemoryStore,
        writer::WriterConfig,
    };

    #[test]
    fn annotations_are_attached() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = super::super::load::test::write_input(&tmp_dir, "f1", &["0/1", "0/0"])?;
        let store = Arc::new(MemoryStore::new());
        super::super::load::load_file(
            store.clone(),
            &path,
            WriterConfig::default(),
            10,
        )?;
        let registry = Arc::new(SourceRegistry::new(store.clone(), FILES_COLLECTION));
        let adaptor = VariantDbAdaptor::new(store, VARIANTS_COLLECTION, registry);

        let input = [
            r#"{"chromosome": "1", "start": 100, "reference_allele": "A", "alternative_allele": "G", "xrefs": [{"id": "BRCA2", "src": "HGNC"}]}"#,
            "",
            r#"{"chromosome": "1", "start": 300, "reference_allele": "A", "alternative_allele": "G"}"#,
        ]
        .join("\n");
        let result = annotate_from_reader(&adaptor, input.as_bytes(), 1)?;

        assert_eq!(result.matched, 1);
        assert_eq!(result.modified, 1);
        let by_gene = adaptor.get_all_variants_by_gene("BRCA2", &QueryOptions::new())?;
        assert_eq!(by_gene.num_results, 1);
        assert_eq!(by_gene.result[0].start, 100);

        Ok(())
    }

    #[test]
    fn malformed_line_is_an_error() -> Result<(), anyhow::Error> {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SourceRegistry::new(store.clone(), FILES_COLLECTION));
        let adaptor = VariantDbAdaptor::new(store, VARIANTS_COLLECTION, registry);

        let result = annotate_from_reader(&adaptor, "{not json".as_bytes(), 10);

        assert!(result.is_err());

        Ok(())
    }
}
