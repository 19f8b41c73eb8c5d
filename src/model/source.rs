//! Summary of a loaded source file.

use indexmap::IndexMap;

/// Key of the file header in `VariantSource::metadata`.
pub const VARIANT_FILE_HEADER: &str = "variantFileHeader";

/// Type of the study a file belongs to.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
    clap::ValueEnum,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StudyType {
    #[default]
    Collection,
    Family,
    Trio,
    Control,
    Case,
    CaseControl,
    Paired,
    PairedTumor,
    TimeSeries,
    Aggregate,
}

/// Global statistics over all variants of one file.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariantGlobalStats {
    pub samples_count: i32,
    pub variants_count: i32,
    pub snps_count: i32,
    pub indels_count: i32,
    pub structural_count: i32,
    pub pass_count: i32,
    pub transitions_count: i32,
    pub transversions_count: i32,
    pub mean_quality: f32,
}

/// A study as derived from the summaries of its files.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StudySummary {
    pub study_id: String,
    pub study_name: String,
    pub num_files: u64,
}

/// A loaded file together with its study and samples.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariantSource {
    pub file_id: String,
    pub file_name: String,
    pub study_id: String,
    pub study_name: String,
    #[serde(default)]
    pub study_type: StudyType,
    /// Sample name to 0-based position in the file.
    #[serde(default)]
    pub samples_position: IndexMap<String, i32>,
    #[serde(default)]
    pub stats: Option<VariantGlobalStats>,
    #[serde(default)]
    pub metadata: IndexMap<String, serde_json::Value>,
}

impl VariantSource {
    pub fn new(file_id: &str, file_name: &str, study_id: &str, study_name: &str) -> Self {
        Self {
            file_id: file_id.to_string(),
            file_name: file_name.to_string(),
            study_id: study_id.to_string(),
            study_name: study_name.to_string(),
            ..Default::default()
        }
    }

    /// Set the samples from an ordered list of names.
    pub fn set_sample_names(&mut self, names: &[&str]) {
        self.samples_position = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i as i32))
            .collect();
    }

    /// Sample names ordered by position.
    pub fn sample_names(&self) -> Vec<String> {
        let mut samples = self.samples_position.iter().collect::<Vec<_>>();
        samples.sort_by_key(|(_, pos)| **pos);
        samples.into_iter().map(|(name, _)| name.clone()).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sample_names_follow_positions() {
        let mut source = VariantSource::new("f1", "file1.vcf", "s1", "study1");
        source.samples_position.insert(String::from("NA003"), 2);
        source.samples_position.insert(String::from("NA001"), 0);
        source.samples_position.insert(String::from("NA002"), 1);

        assert_eq!(source.sample_names(), vec!["NA001", "NA002", "NA003"]);
    }

    #[test]
    fn study_type_strings() {
        assert_eq!(StudyType::CaseControl.to_string(), "CASE_CONTROL");
        assert_eq!("TRIO".parse::<StudyType>().ok(), Some(StudyType::Trio));
    }
}
