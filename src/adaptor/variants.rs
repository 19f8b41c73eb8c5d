//! Queries, aggregations and in-place updates of the variants collection.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use indexmap::IndexMap;
use itertools::Itertools;
use serde_json::Value;

use super::Error;
use crate::{
    chunks::{region_filter, Region},
    codec::{
        annotation, source_entry, stats as stats_fields,
        variant::{self, build_storage_id},
        AnnotationCodec, IncludeSrc, SamplesCodec, SourceEntryCodec, StatsCodec, VariantCodec,
    },
    iterator::ResultIterator,
    model::{QueryResult, Variant, VariantAnnotation, VariantStatsWrapper},
    query::{keys, projection::build_projection, QueryOptions, QueryTranslator},
    registry::SourceRegistry,
    storage::{
        filter::resolve_in_map, Document, DocumentStore, Filter, FindOptions, Projection,
        SortOrder, Update, UpdateOp, WriteResult,
    },
};

/// Number of groups returned by `group_by` unless `limit` is given.
pub const DEFAULT_GROUP_LIMIT: usize = 10;
/// Bin width of `get_variant_frequency_by_region` unless `interval` is given.
pub const DEFAULT_INTERVAL: i64 = 20_000;

/// Number of variants sharing one value of the grouping field.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GroupCount {
    pub id: String,
    pub count: u64,
}

/// Number of variants starting in one bin of a region.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrequencyBin {
    pub chromosome: String,
    pub start: i64,
    pub end: i64,
    pub features_count: u64,
}

/// Access to the variants collection.
///
/// Sample names needed to decode genotypes come from the shared `SourceRegistry`.
pub struct VariantDbAdaptor {
    store: Arc<dyn DocumentStore>,
    collection: String,
    registry: Arc<SourceRegistry>,
    translator: QueryTranslator,
}

impl std::fmt::Debug for VariantDbAdaptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantDbAdaptor")
            .field("collection", &self.collection)
            .field("registry", &self.registry)
            .finish()
    }
}

/// Codec decoding everything stored for a variant.
fn full_codec(samples: SamplesCodec) -> VariantCodec {
    VariantCodec::new(
        Some(SourceEntryCodec::new(IncludeSrc::Full, Some(samples))),
        Some(StatsCodec),
    )
}

/// Projection, sort and paging of a find.
fn find_options(options: &QueryOptions) -> FindOptions {
    let sort = if options.get_bool(keys::SORT).unwrap_or(false) {
        vec![
            (variant::CHROMOSOME_FIELD.to_string(), SortOrder::Ascending),
            (variant::START_FIELD.to_string(), SortOrder::Ascending),
        ]
    } else {
        Vec::new()
    };
    FindOptions {
        projection: Some(build_projection(options)),
        sort,
        skip: options.get_i64(keys::SKIP).filter(|s| *s > 0).unwrap_or(0) as usize,
        limit: options
            .get_i64(keys::LIMIT)
            .filter(|l| *l > 0)
            .map(|l| l as usize),
    }
}

/// Append `value` to the comma-separated list at `key`.
fn add_to_list(options: &mut QueryOptions, key: &str, value: &str) {
    let mut list = options.get_list(key);
    list.push(value.to_string());
    options.put(key, list.join(","));
}

/// Whether `order` asks for descending order; `-1` and `desc` do, as does absence.
fn descending(options: &QueryOptions) -> bool {
    match options.get_i64(keys::ORDER) {
        Some(order) => order < 0,
        None => !matches!(
            options.get_str(keys::ORDER).as_deref(),
            Some("asc") | Some("ASC") | Some("ascending")
        ),
    }
}

fn group_path(field: &str) -> String {
    let leaf = match field {
        "ensemblGene" => annotation::ENSEMBL_GENE_ID_FIELD,
        "ct" | "consequence_type" => annotation::SO_ACCESSION_FIELD,
        _ => annotation::GENE_NAME_FIELD,
    };
    format!(
        "{}.{}.{}",
        variant::ANNOTATION_FIELD,
        annotation::CONSEQUENCE_TYPE_FIELD,
        leaf
    )
}

fn group_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Start of bin `bin`; the first bin starts at position 1.
fn bin_start(bin: i64, interval: i64) -> i64 {
    if bin == 0 {
        1
    } else {
        bin * interval
    }
}

impl VariantDbAdaptor {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str, registry: Arc<SourceRegistry>) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            registry,
            translator: QueryTranslator,
        }
    }

    fn find_documents(&self, filter: &Filter, find: &FindOptions) -> Result<Vec<Document>, Error> {
        Ok(self
            .store
            .find(&self.collection, filter, find)?
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Decode documents with the sample names of the files they reference.
    fn decode_documents(&self, documents: &[Document]) -> Result<Vec<Variant>, Error> {
        let path = format!("{}.{}", variant::FILES_FIELD, source_entry::FILE_ID_FIELD);
        let file_ids = documents
            .iter()
            .flat_map(|document| resolve_in_map(document, &path))
            .filter_map(|value| value.as_str().map(|s| s.to_string()))
            .unique()
            .collect::<Vec<_>>();
        let codec = full_codec(SamplesCodec::from_sample_names(
            self.registry.sample_names(&file_ids)?,
        ));
        Ok(documents
            .iter()
            .map(|document| codec.decode(document))
            .collect::<Result<Vec<_>, _>>()?)
    }

    fn run_query(
        &self,
        id: &str,
        filter: Filter,
        options: &QueryOptions,
    ) -> Result<QueryResult<Variant>, Error> {
        let before = Instant::now();
        let documents = self.find_documents(&filter, &find_options(options))?;
        let db_time = before.elapsed();
        let variants = self.decode_documents(&documents)?;

        let mut result = QueryResult::new(id, db_time, variants);
        if options.get_bool(keys::COUNT).unwrap_or(false) {
            result.num_total_results = self.store.count(&self.collection, &filter)?;
        }
        tracing::debug!(
            "query {:?} returned {} variants in {:?}",
            id,
            result.num_results,
            before.elapsed()
        );
        Ok(result)
    }

    /// Number of variants matching `options`.
    pub fn count(&self, options: &QueryOptions) -> Result<u64, Error> {
        let mut options = options.clone();
        let filter = self.translator.translate(&mut options)?;
        Ok(self.store.count(&self.collection, &filter)?)
    }

    pub fn get_all_variants(&self, options: &QueryOptions) -> Result<QueryResult<Variant>, Error> {
        let mut options = options.clone();
        let filter = self.translator.translate(&mut options)?;
        self.run_query("", filter, &options)
    }

    /// Variants with `id` as variant id or cross-reference.
    pub fn get_variant_by_id(
        &self,
        id: &str,
        options: &QueryOptions,
    ) -> Result<QueryResult<Variant>, Error> {
        let mut options = options.clone();
        add_to_list(&mut options, keys::ID, id);
        let filter = self.translator.translate(&mut options)?;
        self.run_query(id, filter, &options)
    }

    /// One result per id.
    pub fn get_all_variants_by_id_list(
        &self,
        ids: &[String],
        options: &QueryOptions,
    ) -> Result<Vec<QueryResult<Variant>>, Error> {
        ids.iter()
            .map(|id| self.get_variant_by_id(id, options))
            .collect()
    }

    pub fn get_all_variants_by_region(
        &self,
        region: &Region,
        options: &QueryOptions,
    ) -> Result<QueryResult<Variant>, Error> {
        let mut options = options.clone();
        let filter = Filter::and(vec![
            region_filter(region),
            self.translator.translate(&mut options)?,
        ]);
        self.run_query(&region.to_string(), filter, &options)
    }

    /// Variants in `region` seen in one of `study_ids`, keeping only the source
    /// entries of those studies.  No studies match nothing.
    pub fn get_all_variants_by_region_and_studies(
        &self,
        region: &Region,
        study_ids: &[String],
        options: &QueryOptions,
    ) -> Result<QueryResult<Variant>, Error> {
        if study_ids.is_empty() {
            return Ok(QueryResult::new(
                &region.to_string(),
                std::time::Duration::ZERO,
                Vec::new(),
            ));
        }
        let mut options = options.clone();
        for study_id in study_ids {
            add_to_list(&mut options, keys::STUDIES, study_id);
        }
        let mut result = self.get_all_variants_by_region(region, &options)?;
        for variant in result.result.iter_mut() {
            variant
                .source_entries
                .retain(|_, entry| study_ids.contains(&entry.study_id));
        }
        Ok(result)
    }

    /// One result per region, or a single one with `merge=true`.
    pub fn get_all_variants_by_region_list(
        &self,
        regions: &[Region],
        options: &QueryOptions,
    ) -> Result<Vec<QueryResult<Variant>>, Error> {
        if options.get_bool(keys::MERGE).unwrap_or(false) {
            let mut options = options.clone();
            for region in regions {
                add_to_list(&mut options, keys::REGION, &region.to_string());
            }
            let filter = self.translator.translate(&mut options)?;
            Ok(vec![self.run_query(
                &regions.iter().join(","),
                filter,
                &options,
            )?])
        } else {
            regions
                .iter()
                .map(|region| self.get_all_variants_by_region(region, options))
                .collect()
        }
    }

    pub fn get_all_variants_by_gene(
        &self,
        gene: &str,
        options: &QueryOptions,
    ) -> Result<QueryResult<Variant>, Error> {
        let mut options = options.clone();
        options.put(keys::GENE, gene);
        let filter = self.translator.translate(&mut options)?;
        self.run_query(gene, filter, &options)
    }

    /// Lazily decoded variants matching `options`.
    pub fn iterator(&self, options: &QueryOptions) -> Result<ResultIterator<'_>, Error> {
        let mut options = options.clone();
        let filter = self.translator.translate(&mut options)?;
        let codec = full_codec(SamplesCodec::from_sample_names(
            self.registry.all_sample_names()?,
        ));
        let cursor = self
            .store
            .find(&self.collection, &filter, &find_options(&options))?;
        Ok(ResultIterator::new(cursor, codec))
    }

    /// Count variants per gene name (`gene`), Ensembl gene (`ensemblGene`) or
    /// consequence type accession (`ct`).
    ///
    /// Groups are ordered by count, descending unless `order` is `1` or `asc`, and cut
    /// at `limit`.
    pub fn group_by(
        &self,
        field: &str,
        options: &QueryOptions,
    ) -> Result<QueryResult<GroupCount>, Error> {
        let path = group_path(field);
        let mut options = options.clone();
        let filter = self.translator.translate(&mut options)?;

        let before = Instant::now();
        let find = FindOptions {
            projection: Some(Projection::default().include(variant::ANNOTATION_FIELD)),
            ..Default::default()
        };
        let mut counts: IndexMap<String, u64> = IndexMap::new();
        for document in self.store.find(&self.collection, &filter, &find)? {
            let document = document?;
            let keys = resolve_in_map(&document, &path)
                .into_iter()
                .flat_map(|value| match value {
                    Value::Array(items) => items.iter().collect::<Vec<_>>(),
                    other => vec![other],
                })
                .filter_map(group_key)
                .unique()
                .collect::<Vec<_>>();
            for key in keys {
                *counts.entry(key).or_default() += 1;
            }
        }

        let descending = descending(&options);
        let mut groups = counts
            .into_iter()
            .map(|(id, count)| GroupCount { id, count })
            .collect::<Vec<_>>();
        groups.sort_by(|a, b| {
            let ordering = if descending {
                b.count.cmp(&a.count)
            } else {
                a.count.cmp(&b.count)
            };
            ordering.then_with(|| a.id.cmp(&b.id))
        });
        let limit = options
            .get_i64(keys::LIMIT)
            .filter(|l| *l > 0)
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_GROUP_LIMIT);
        groups.truncate(limit);

        Ok(QueryResult::new(field, before.elapsed(), groups))
    }

    fn ranking(
        &self,
        field: &str,
        n: usize,
        order: i64,
        options: &QueryOptions,
    ) -> Result<QueryResult<GroupCount>, Error> {
        let options = options
            .clone()
            .with(keys::LIMIT, n as u64)
            .with(keys::ORDER, order);
        self.group_by(field, &options)
    }

    pub fn get_most_affected_genes(
        &self,
        n: usize,
        options: &QueryOptions,
    ) -> Result<QueryResult<GroupCount>, Error> {
        self.ranking("gene", n, -1, options)
    }

    pub fn get_least_affected_genes(
        &self,
        n: usize,
        options: &QueryOptions,
    ) -> Result<QueryResult<GroupCount>, Error> {
        self.ranking("gene", n, 1, options)
    }

    pub fn get_top_consequence_types(
        &self,
        n: usize,
        options: &QueryOptions,
    ) -> Result<QueryResult<GroupCount>, Error> {
        self.ranking("ct", n, -1, options)
    }

    pub fn get_bottom_consequence_types(
        &self,
        n: usize,
        options: &QueryOptions,
    ) -> Result<QueryResult<GroupCount>, Error> {
        self.ranking("ct", n, 1, options)
    }

    /// Histogram of variant starts in `region` with bins of `interval` bp.
    ///
    /// Bins without variants are included.  For a whole chromosome the bins end at the
    /// last one holding a variant.
    pub fn get_variant_frequency_by_region(
        &self,
        region: &Region,
        options: &QueryOptions,
    ) -> Result<QueryResult<FrequencyBin>, Error> {
        let mut options = options.clone();
        let interval = options
            .get_i64(keys::INTERVAL)
            .filter(|i| *i > 0)
            .unwrap_or(DEFAULT_INTERVAL);
        let filter = Filter::and(vec![
            Filter::eq(variant::CHROMOSOME_FIELD, region.chromosome.as_str()),
            Filter::Gte(variant::START_FIELD.to_string(), region.start as f64),
            Filter::Lte(variant::START_FIELD.to_string(), region.end as f64),
            self.translator.translate(&mut options)?,
        ]);

        let before = Instant::now();
        let find = FindOptions {
            projection: Some(Projection::default().include(variant::START_FIELD)),
            ..Default::default()
        };
        let mut counts: BTreeMap<i64, u64> = BTreeMap::new();
        for document in self.store.find(&self.collection, &filter, &find)? {
            let document = document?;
            if let Some(start) = document.get(variant::START_FIELD).and_then(|v| v.as_i64()) {
                *counts.entry(start / interval).or_default() += 1;
            }
        }

        let first = region.start as i64 / interval;
        let last = if region.is_whole_chromosome() {
            counts.keys().next_back().copied().unwrap_or(first)
        } else {
            region.end as i64 / interval
        };
        let bins = (first..=last)
            .map(|bin| FrequencyBin {
                chromosome: region.chromosome.clone(),
                start: bin_start(bin, interval),
                end: bin * interval + interval - 1,
                features_count: counts.get(&bin).copied().unwrap_or(0),
            })
            .collect::<Vec<_>>();

        Ok(QueryResult::new(&region.to_string(), before.elapsed(), bins))
    }

    /// Execute updates; a failure is logged and reported in `error_msg`.
    fn bulk_update(&self, ops: &[UpdateOp], before: Instant) -> QueryResult<WriteResult> {
        match self.store.bulk_write(&self.collection, ops) {
            Ok(write) => {
                let mut result = QueryResult::new("", before.elapsed(), vec![write]);
                result.num_results = write.modified as usize;
                result.num_total_results = write.modified;
                result
            }
            Err(e) => {
                tracing::error!("problem executing bulk update: {}", e);
                let mut result = QueryResult::new("", before.elapsed(), Vec::new());
                result.error_msg = e.to_string();
                result
            }
        }
    }

    /// Replace the annotation of existing variants; unknown variants are skipped.
    pub fn update_annotations(&self, annotations: &[VariantAnnotation]) -> QueryResult<WriteResult> {
        let before = Instant::now();
        let ops = annotations
            .iter()
            .map(|annotation| {
                let id = build_storage_id(
                    &annotation.chromosome,
                    annotation.start,
                    &annotation.reference_allele,
                    &annotation.alternative_allele,
                );
                UpdateOp::update_one(
                    Filter::eq(variant::ID_FIELD, id),
                    Update::default().set(
                        variant::ANNOTATION_FIELD,
                        Value::Object(AnnotationCodec.encode(annotation)),
                    ),
                )
            })
            .collect::<Vec<_>>();
        self.bulk_update(&ops, before)
    }

    /// Append cohort stats computed for `file_id` of `study_id`.
    ///
    /// With `overwrite`, stats of the same cohort, file and study are removed first.
    pub fn update_stats(
        &self,
        wrappers: &[VariantStatsWrapper],
        study_id: &str,
        file_id: &str,
        overwrite: bool,
    ) -> QueryResult<WriteResult> {
        let before = Instant::now();
        let ops = wrappers
            .iter()
            .filter_map(|wrapper| {
                let cohorts =
                    StatsCodec.encode_cohorts(wrapper.cohort_stats.iter(), study_id, file_id);
                if cohorts.is_empty() {
                    return None;
                }
                let id = build_storage_id(
                    &wrapper.chromosome,
                    wrapper.position,
                    &wrapper.reference,
                    &wrapper.alternate,
                );
                let mut update = Update::default();
                if overwrite {
                    let previous = wrapper
                        .cohort_stats
                        .keys()
                        .map(|cohort_id| {
                            Filter::and(vec![
                                Filter::eq(stats_fields::COHORT_ID_FIELD, cohort_id.as_str()),
                                Filter::eq(stats_fields::FILE_ID_FIELD, file_id),
                                Filter::eq(stats_fields::STUDY_ID_FIELD, study_id),
                            ])
                        })
                        .collect();
                    update = update.pull_any(variant::STATS_FIELD, previous);
                }
                Some(UpdateOp::update_one(
                    Filter::eq(variant::ID_FIELD, id),
                    update.push(variant::STATS_FIELD, cohorts),
                ))
            })
            .collect::<Vec<_>>();
        self.bulk_update(&ops, before)
    }
}
