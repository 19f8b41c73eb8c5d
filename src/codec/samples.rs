//! Per-sample genotypes of a source entry, stored in its `samp` sub-document.
//!
//! Samples are grouped by genotype: `{"0/1": [1, 4], "1/1": [7]}` lists the positions
//! of the samples carrying each genotype.  With compression enabled, the samples of the
//! default genotype are not listed but implied by `"def": "0/0"`.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;

use super::{genotype_from_storage, genotype_to_storage};
use crate::{
    model::{source_entry::GENOTYPE_KEY, VariantSource, VariantSourceEntry},
    storage::Document,
};

pub const DEFAULT_GENOTYPE_FIELD: &str = "def";

/// Genotype recorded for samples without `GT` data.
const MISSING_GENOTYPE: &str = "./.";

#[derive(Debug, Clone, Default)]
pub struct SamplesCodec {
    /// File id to sample name to position.
    samples_position: HashMap<String, IndexMap<String, i32>>,
    /// Explicit sample name to id mapping used instead of the positions.
    sample_ids: Option<IndexMap<String, i32>>,
    /// Whether to collapse the default genotype into `def`.
    compress_default_genotype: bool,
    /// Genotype to use as `def`, the most common one if unset.
    default_genotype: Option<String>,
}

impl SamplesCodec {
    pub fn new(samples_position: HashMap<String, IndexMap<String, i32>>) -> Self {
        Self {
            samples_position,
            compress_default_genotype: true,
            ..Default::default()
        }
    }

    /// Build from ordered sample names per file id.
    pub fn from_sample_names(names: HashMap<String, Vec<String>>) -> Self {
        Self::new(
            names
                .into_iter()
                .map(|(file_id, names)| {
                    let positions = names
                        .into_iter()
                        .enumerate()
                        .map(|(i, name)| (name, i as i32))
                        .collect();
                    (file_id, positions)
                })
                .collect(),
        )
    }

    pub fn from_sources(sources: &[VariantSource]) -> Self {
        Self::new(
            sources
                .iter()
                .map(|source| (source.file_id.clone(), source.samples_position.clone()))
                .collect(),
        )
    }

    pub fn with_sample_ids(mut self, sample_ids: Option<IndexMap<String, i32>>) -> Self {
        self.sample_ids = sample_ids.filter(|ids| !ids.is_empty());
        self
    }

    pub fn with_compression(mut self, compress: bool, default_genotype: Option<String>) -> Self {
        self.compress_default_genotype = compress;
        self.default_genotype = default_genotype;
        self
    }

    /// Sample names of `file_id` in position order, if known.
    fn sample_names(&self, file_id: &str) -> Option<Vec<(String, i32)>> {
        if let Some(sample_ids) = &self.sample_ids {
            let mut result = sample_ids
                .iter()
                .map(|(name, id)| (name.clone(), *id))
                .collect::<Vec<_>>();
            result.sort_by_key(|(_, id)| *id);
            return Some(result);
        }
        self.samples_position.get(file_id).map(|positions| {
            let mut result = positions
                .iter()
                .map(|(name, pos)| (name.clone(), *pos))
                .collect::<Vec<_>>();
            result.sort_by_key(|(_, pos)| *pos);
            result
        })
    }

    fn sample_position(&self, file_id: &str, name: &str, ordinal: usize) -> Option<i32> {
        if let Some(sample_ids) = &self.sample_ids {
            return sample_ids.get(name).copied();
        }
        match self.samples_position.get(file_id) {
            Some(positions) => positions.get(name).copied(),
            None => Some(ordinal as i32),
        }
    }

    pub fn encode(&self, entry: &VariantSourceEntry) -> Document {
        let mut by_genotype: IndexMap<String, Vec<i32>> = IndexMap::new();
        for (ordinal, (name, data)) in entry.samples_data.iter().enumerate() {
            let Some(position) = self.sample_position(&entry.file_id, name, ordinal) else {
                tracing::warn!(
                    "sample {:?} unknown for file {:?}, skipping",
                    name,
                    &entry.file_id
                );
                continue;
            };
            let genotype = data
                .get(GENOTYPE_KEY)
                .map(|gt| gt.as_str())
                .unwrap_or(MISSING_GENOTYPE);
            by_genotype
                .entry(genotype_to_storage(genotype))
                .or_default()
                .push(position);
        }

        let mut document = Document::new();
        if self.compress_default_genotype {
            let default_genotype = match &self.default_genotype {
                Some(genotype) => Some(genotype_to_storage(genotype)),
                None => most_common(&by_genotype),
            };
            if let Some(default_genotype) = default_genotype {
                by_genotype.shift_remove(&default_genotype);
                document.insert(
                    DEFAULT_GENOTYPE_FIELD.into(),
                    Value::from(genotype_from_storage(&default_genotype)),
                );
            }
        }
        for (genotype, positions) in by_genotype {
            document.insert(genotype, Value::from(positions));
        }
        document
    }

    /// Decode `samp` of an entry from `file_id` into per-sample `GT` data.
    pub fn decode(
        &self,
        file_id: &str,
        document: &Document,
    ) -> IndexMap<String, IndexMap<String, String>> {
        let Some(names) = self.sample_names(file_id) else {
            tracing::warn!("no sample names known for file {:?}", file_id);
            return IndexMap::new();
        };
        let by_position = names
            .iter()
            .map(|(name, pos)| (*pos, name.as_str()))
            .collect::<HashMap<_, _>>();

        let mut genotypes: HashMap<&str, String> = HashMap::new();
        for (key, value) in document {
            if key == DEFAULT_GENOTYPE_FIELD {
                continue;
            }
            let genotype = genotype_from_storage(key);
            for position in value.as_array().into_iter().flatten() {
                let known = position
                    .as_i64()
                    .and_then(|pos| i32::try_from(pos).ok())
                    .and_then(|pos| by_position.get(&pos));
                match known {
                    Some(name) => {
                        genotypes.insert(*name, genotype.clone());
                    }
                    None => tracing::warn!(
                        "unknown sample position {} in file {:?}",
                        position,
                        file_id
                    ),
                }
            }
        }

        let default_genotype = document
            .get(DEFAULT_GENOTYPE_FIELD)
            .and_then(|def| def.as_str());
        names
            .iter()
            .filter_map(|(name, _)| {
                let genotype = genotypes
                    .remove(name.as_str())
                    .or_else(|| default_genotype.map(|gt| gt.to_string()))?;
                Some((
                    name.clone(),
                    IndexMap::from([(GENOTYPE_KEY.to_string(), genotype)]),
                ))
            })
            .collect()
    }
}

/// Genotype with the most samples, the first seen one on ties.
fn most_common(by_genotype: &IndexMap<String, Vec<i32>>) -> Option<String> {
    let mut best: Option<(&String, usize)> = None;
    for (genotype, positions) in by_genotype {
        if best.map_or(true, |(_, count)| positions.len() > count) {
            best = Some((genotype, positions.len()));
        }
    }
    best.map(|(genotype, _)| genotype.clone())
}
