//! Loading of variants of one source file with merge-on-conflict semantics.
//!
//! Every variant becomes an upsert keyed by its storage id.  The first writer to touch
//! a variant inserts the base document; later writers only append their own source
//! entry, cohort stats and ids.  Several writers may thus run concurrently on the same
//! store without coordination beyond the atomic single-document update of the store.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    codec::{
        self, source::SourceCodec, variant, IncludeSrc, SamplesCodec, SourceEntryCodec,
        StatsCodec, VariantCodec,
    },
    model::{Variant, VariantSource},
    storage::{self, DocumentStore, Filter, IndexSpec, Update, UpdateOp, WriteResult},
};

/// Error type for `BulkMergeWriter`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("cannot {op} writer in state {state}")]
    InvalidState { op: &'static str, state: WriterState },
    #[error("problem accessing the store: {0}")]
    Storage(#[from] storage::Error),
    #[error("problem encoding variant: {0}")]
    Codec(#[from] codec::Error),
}

/// Configuration of a `BulkMergeWriter`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, derive_builder::Builder)]
#[builder(default)]
pub struct WriterConfig {
    /// Whether to store the per-sample genotypes.
    pub include_samples: bool,
    /// Whether to store the cohort stats.
    pub include_stats: bool,
    /// How much of the original source line to keep.
    pub include_src: IncludeSrc,
    /// Whether to collapse the most common genotype into `def`.
    pub compress_default_genotype: bool,
    /// Genotype to use as `def` instead of the most common one.
    pub default_genotype: Option<String>,
    /// Number of pending updates that triggers a bulk write.
    pub bulk_size: usize,
    /// Sample name to id mapping, the sample positions of the source if unset.
    pub sample_ids: Option<IndexMap<String, i32>>,
    /// Name of the variants collection.
    pub variants_collection: String,
    /// Name of the source summary collection.
    pub files_collection: String,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            include_samples: true,
            include_stats: true,
            include_src: IncludeSrc::default(),
            compress_default_genotype: true,
            default_genotype: None,
            bulk_size: 100,
            sample_ids: None,
            variants_collection: String::from(crate::VARIANTS_COLLECTION),
            files_collection: String::from(crate::FILES_COLLECTION),
        }
    }
}

/// Lifecycle state of a `BulkMergeWriter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum WriterState {
    Created,
    Open,
    Ready,
    Finished,
    Closed,
}

/// Counters of a writer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Number of variants passed to `write`.
    pub variants: u64,
    /// Number of updates sent to the store.
    pub updates: u64,
    /// Number of updates dropped with a failed batch.
    pub dropped: u64,
    /// Combined result of the bulk writes.
    pub result: WriteResult,
}

/// Writes the variants of one source file.
///
/// Call `open`, `pre`, `write` any number of times, `post` and `close` in this order.
pub struct BulkMergeWriter {
    store: Arc<dyn DocumentStore>,
    source: VariantSource,
    config: WriterConfig,
    /// Shared between the writers of one source file so that its summary is written once.
    summary_written: Arc<AtomicBool>,
    state: WriterState,
    variant_codec: VariantCodec,
    entry_codec: SourceEntryCodec,
    stats_codec: Option<StatsCodec>,
    pending: Vec<UpdateOp>,
    stats: WriterStats,
}

impl std::fmt::Debug for BulkMergeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkMergeWriter")
            .field("source", &self.source.file_id)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl BulkMergeWriter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        source: VariantSource,
        config: WriterConfig,
        summary_written: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            source,
            config,
            summary_written,
            state: WriterState::Created,
            variant_codec: VariantCodec::new(None, None),
            entry_codec: SourceEntryCodec::default(),
            stats_codec: None,
            pending: Vec::new(),
            stats: WriterStats::default(),
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    fn expect_state(&self, op: &'static str, expected: &[WriterState]) -> Result<(), Error> {
        if expected.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                op,
                state: self.state,
            })
        }
    }

    /// Make sure the collections are usable.
    pub fn open(&mut self) -> Result<(), Error> {
        self.expect_state("open", &[WriterState::Created])?;
        self.store
            .ensure_collection(&self.config.variants_collection)?;
        self.store.ensure_collection(&self.config.files_collection)?;
        self.state = WriterState::Open;
        Ok(())
    }

    /// Set up the codecs.
    pub fn pre(&mut self) -> Result<(), Error> {
        self.expect_state("pre", &[WriterState::Open])?;

        let sample_ids = match &self.config.sample_ids {
            Some(ids) if !ids.is_empty() => ids.clone(),
            _ => {
                tracing::debug!("using sample positions as sample ids");
                self.source.samples_position.clone()
            }
        };
        let samples = if self.config.include_samples {
            Some(
                SamplesCodec::from_sources(std::slice::from_ref(&self.source))
                    .with_sample_ids(Some(sample_ids))
                    .with_compression(
                        self.config.compress_default_genotype,
                        self.config.default_genotype.clone(),
                    ),
            )
        } else {
            None
        };
        self.entry_codec = SourceEntryCodec::new(self.config.include_src, samples);
        self.stats_codec = self.config.include_stats.then_some(StatsCodec);
        self.pending.clear();

        self.state = WriterState::Ready;
        Ok(())
    }

    /// Queue the updates for `variants`, executing a batch when full.
    pub fn write(&mut self, variants: &[Variant]) -> Result<(), Error> {
        self.expect_state("write", &[WriterState::Ready])?;

        for variant in variants {
            self.stats.variants += 1;
            if self.stats.variants % 1000 == 0 {
                tracing::info!("num variants written {}", self.stats.variants);
            }
            let ops = self.build_updates(variant)?;
            self.pending.extend(ops);
        }

        if self.pending.len() >= self.config.bulk_size && !self.pending.is_empty() {
            self.execute_bulk();
        }
        Ok(())
    }

    /// One upsert per source entry of this writer's file.
    fn build_updates(&self, variant: &Variant) -> Result<Vec<UpdateOp>, Error> {
        let entries = variant
            .source_entries
            .values()
            .filter(|entry| entry.file_id == self.source.file_id)
            .collect::<Vec<_>>();
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let base = self.variant_codec.encode(variant)?;
        let id = self.variant_codec.storage_id(variant);
        let ids = variant
            .ids
            .iter()
            .map(|id| Value::from(id.as_str()))
            .collect::<Vec<_>>();

        let mut result = Vec::with_capacity(entries.len());
        for entry in entries {
            let filter = Filter::and(vec![
                Filter::eq(variant::ID_FIELD, id.as_str()),
                Filter::eq(variant::CHROMOSOME_FIELD, variant.chromosome.as_str()),
                Filter::eq(variant::START_FIELD, variant.start),
            ]);
            let mut update = Update::default()
                .set_on_insert(base.clone())
                .add_to_set(
                    variant::FILES_FIELD,
                    vec![Value::Object(self.entry_codec.encode(entry)?)],
                );
            if let Some(codec) = &self.stats_codec {
                update = update.add_to_set(variant::STATS_FIELD, codec.encode_cohort_stats(entry));
            }
            if !ids.is_empty() {
                update = update.add_to_set(variant::IDS_FIELD, ids.clone());
            }
            result.push(UpdateOp::upsert_one(filter, update));
        }
        Ok(result)
    }

    /// Send the pending updates; a failed batch is logged and dropped.
    fn execute_bulk(&mut self) {
        let before = std::time::Instant::now();
        let ops = std::mem::take(&mut self.pending);
        tracing::debug!("executing bulk of {} updates", ops.len());
        match self
            .store
            .bulk_write(&self.config.variants_collection, &ops)
        {
            Ok(result) => {
                self.stats.updates += ops.len() as u64;
                self.stats.result += result;
            }
            Err(e) => {
                tracing::error!(
                    "bulk write of {} updates for file {} failed: {}",
                    ops.len(),
                    &self.source.file_id,
                    e
                );
                self.stats.dropped += ops.len() as u64;
            }
        }
        tracing::trace!("bulk done in {:?}", before.elapsed());
    }

    /// Write the source summary unless another writer of the same file already did.
    fn write_source_summary(&self) -> Result<(), Error> {
        if self
            .summary_written
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        let document = SourceCodec.encode(&self.source);
        match self
            .store
            .insert_if_absent(&self.config.files_collection, document)
        {
            Ok(inserted) => {
                if !inserted {
                    tracing::debug!("summary of file {} already stored", &self.source.file_id);
                }
                Ok(())
            }
            Err(e) => {
                self.summary_written.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Flush, write the source summary and request the query indexes.
    pub fn post(&mut self) -> Result<(), Error> {
        self.expect_state("post", &[WriterState::Ready])?;
        if !self.pending.is_empty() {
            self.execute_bulk();
        }
        self.write_source_summary()?;

        let collection = &self.config.variants_collection;
        for keys in index_keys() {
            self.store
                .create_index(collection, &IndexSpec::new(&keys, true))?;
        }
        tracing::debug!("sent order to create indices");

        self.state = WriterState::Finished;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.expect_state("close", &[WriterState::Open, WriterState::Finished])?;
        tracing::info!(
            "closed writer for file {}: {} variants, {} updates, {} dropped",
            &self.source.file_id,
            self.stats.variants,
            self.stats.updates,
            self.stats.dropped
        );
        self.state = WriterState::Closed;
        Ok(())
    }
}

/// Indexes backing the query translator.
fn index_keys() -> Vec<Vec<(&'static str, i32)>> {
    vec![
        vec![("_at.chunkIds", 1)],
        vec![("annot.xrefs.id", 1)],
        vec![("annot.ct.so", 1)],
        vec![(variant::IDS_FIELD, 1)],
        vec![(variant::CHROMOSOME_FIELD, 1)],
        vec![("files.sid", 1), ("files.fid", 1)],
        vec![("st.maf", 1)],
        vec![("st.mgf", 1)],
        vec![
            (variant::CHROMOSOME_FIELD, 1),
            (variant::START_FIELD, 1),
            (variant::END_FIELD, 1),
        ],
    ]
}
