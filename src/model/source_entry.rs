//! Per-file contribution to a variant.

use indexmap::IndexMap;

use super::VariantStats;

/// The genotype key in per-sample data.
pub const GENOTYPE_KEY: &str = "GT";

/// Attribute key that carries the original input line.
pub const SRC_ATTRIBUTE: &str = "src";

/// The data one source file contributes to a shared variant record.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariantSourceEntry {
    /// Identifier of the source file.
    pub file_id: String,
    /// Identifier of the study the file belongs to.
    pub study_id: String,
    /// Further alternate alleles at this site, without the primary one.
    #[serde(default)]
    pub secondary_alternates: Vec<String>,
    /// Free-form attributes, e.g., `QUAL` or the `src` line.
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
    /// Genotype format string, e.g., `GT:DP`.
    #[serde(default)]
    pub format: String,
    /// Per-sample data, sample name to format key to value.
    #[serde(default)]
    pub samples_data: IndexMap<String, IndexMap<String, String>>,
    /// Statistics by cohort.
    #[serde(default)]
    pub cohort_stats: IndexMap<String, VariantStats>,
}

impl VariantSourceEntry {
    pub fn new(file_id: &str, study_id: &str) -> Self {
        Self {
            file_id: file_id.to_string(),
            study_id: study_id.to_string(),
            ..Default::default()
        }
    }

    /// Key of the entry within `Variant::source_entries`.
    pub fn build_key(study_id: &str, file_id: &str) -> String {
        format!("{}_{}", study_id, file_id)
    }

    pub fn key(&self) -> String {
        Self::build_key(&self.study_id, &self.file_id)
    }

    pub fn add_attribute(&mut self, key: &str, value: &str) {
        self.attributes.insert(key.to_string(), value.to_string());
    }

    pub fn add_sample_data(&mut self, sample: &str, data: IndexMap<String, String>) {
        self.samples_data.insert(sample.to_string(), data);
    }

    /// Genotype call of `sample`, if present.
    pub fn sample_genotype(&self, sample: &str) -> Option<&str> {
        self.samples_data
            .get(sample)
            .and_then(|data| data.get(GENOTYPE_KEY))
            .map(|gt| gt.as_str())
    }
}
