//! Source summaries of the `files` collection.

use serde_json::Value;

use super::{get_f64, get_i32, get_string, Error};
use crate::{
    model::{source::VARIANT_FILE_HEADER, StudyType, VariantGlobalStats, VariantSource},
    storage::Document,
};

pub const ID_FIELD: &str = "_id";
pub const FILE_ID_FIELD: &str = "fid";
pub const FILE_NAME_FIELD: &str = "fname";
pub const STUDY_ID_FIELD: &str = "sid";
pub const STUDY_NAME_FIELD: &str = "sname";
pub const STUDY_TYPE_FIELD: &str = "stype";
pub const DATE_FIELD: &str = "date";
pub const SAMPLES_FIELD: &str = "samp";
pub const STATS_FIELD: &str = "st";
pub const NUM_SAMPLES_FIELD: &str = "nSamp";
pub const NUM_VARIANTS_FIELD: &str = "nVar";
pub const NUM_SNPS_FIELD: &str = "nSnp";
pub const NUM_INDELS_FIELD: &str = "nIndel";
pub const NUM_STRUCTURAL_FIELD: &str = "nSv";
pub const NUM_PASS_FILTERS_FIELD: &str = "nPass";
pub const NUM_TRANSITIONS_FIELD: &str = "nTi";
pub const NUM_TRANSVERSIONS_FIELD: &str = "nTv";
pub const MEAN_QUALITY_FIELD: &str = "meanQ";
pub const METADATA_FIELD: &str = "meta";
pub const HEADER_FIELD: &str = "header";

/// `_id` of the summary of `file_id` in `study_id`.
pub fn build_source_id(study_id: &str, file_id: &str) -> String {
    format!("{}_{}", study_id, file_id)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SourceCodec;

impl SourceCodec {
    pub fn encode(&self, source: &VariantSource) -> Document {
        let mut document = Document::new();
        document.insert(
            ID_FIELD.into(),
            Value::from(build_source_id(&source.study_id, &source.file_id)),
        );
        document.insert(FILE_NAME_FIELD.into(), Value::from(source.file_name.as_str()));
        document.insert(FILE_ID_FIELD.into(), Value::from(source.file_id.as_str()));
        document.insert(STUDY_NAME_FIELD.into(), Value::from(source.study_name.as_str()));
        document.insert(STUDY_ID_FIELD.into(), Value::from(source.study_id.as_str()));
        document.insert(
            DATE_FIELD.into(),
            Value::from(chrono::Local::now().to_rfc3339()),
        );
        document.insert(
            STUDY_TYPE_FIELD.into(),
            Value::from(source.study_type.to_string()),
        );
        document.insert(
            SAMPLES_FIELD.into(),
            Value::Object(
                source
                    .samples_position
                    .iter()
                    .map(|(name, pos)| (name.clone(), Value::from(*pos)))
                    .collect(),
            ),
        );

        if let Some(stats) = &source.stats {
            document.insert(STATS_FIELD.into(), Value::Object(self.encode_stats(stats)));
        }

        let metadata = source
            .metadata
            .iter()
            .map(|(key, value)| {
                if key == VARIANT_FILE_HEADER {
                    (HEADER_FIELD.to_string(), value.clone())
                } else {
                    (key.clone(), value.clone())
                }
            })
            .collect::<Document>();
        document.insert(METADATA_FIELD.into(), Value::Object(metadata));

        document
    }

    pub fn encode_stats(&self, stats: &VariantGlobalStats) -> Document {
        [
            (NUM_SAMPLES_FIELD, Value::from(stats.samples_count)),
            (NUM_VARIANTS_FIELD, Value::from(stats.variants_count)),
            (NUM_SNPS_FIELD, Value::from(stats.snps_count)),
            (NUM_INDELS_FIELD, Value::from(stats.indels_count)),
            (NUM_STRUCTURAL_FIELD, Value::from(stats.structural_count)),
            (NUM_PASS_FILTERS_FIELD, Value::from(stats.pass_count)),
            (NUM_TRANSITIONS_FIELD, Value::from(stats.transitions_count)),
            (NUM_TRANSVERSIONS_FIELD, Value::from(stats.transversions_count)),
            (MEAN_QUALITY_FIELD, Value::from(stats.mean_quality as f64)),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
    }

    pub fn decode(&self, document: &Document) -> Result<VariantSource, Error> {
        let mut source = VariantSource::new(
            &get_string(document, FILE_ID_FIELD),
            &get_string(document, FILE_NAME_FIELD),
            &get_string(document, STUDY_ID_FIELD),
            &get_string(document, STUDY_NAME_FIELD),
        );
        let study_type = get_string(document, STUDY_TYPE_FIELD);
        source.study_type = study_type.parse::<StudyType>().unwrap_or_else(|_| {
            if !study_type.is_empty() {
                tracing::warn!("unknown study type {:?}", &study_type);
            }
            StudyType::default()
        });

        if let Some(Value::Object(samples)) = document.get(SAMPLES_FIELD) {
            for name in samples.keys() {
                source
                    .samples_position
                    .insert(name.clone(), get_i32(samples, name, -1)?);
            }
            source.samples_position.sort_by(|_, lhs, _, rhs| lhs.cmp(rhs));
        }

        if let Some(Value::Object(stats)) = document.get(STATS_FIELD) {
            source.stats = Some(VariantGlobalStats {
                samples_count: get_i32(stats, NUM_SAMPLES_FIELD, 0)?,
                variants_count: get_i32(stats, NUM_VARIANTS_FIELD, 0)?,
                snps_count: get_i32(stats, NUM_SNPS_FIELD, 0)?,
                indels_count: get_i32(stats, NUM_INDELS_FIELD, 0)?,
                structural_count: get_i32(stats, NUM_STRUCTURAL_FIELD, 0)?,
                pass_count: get_i32(stats, NUM_PASS_FILTERS_FIELD, 0)?,
                transitions_count: get_i32(stats, NUM_TRANSITIONS_FIELD, 0)?,
                transversions_count: get_i32(stats, NUM_TRANSVERSIONS_FIELD, 0)?,
                mean_quality: get_f64(stats, MEAN_QUALITY_FIELD, 0.0) as f32,
            });
        }

        if let Some(Value::Object(metadata)) = document.get(METADATA_FIELD) {
            for (key, value) in metadata {
                let key = if key == HEADER_FIELD {
                    VARIANT_FILE_HEADER
                } else {
                    key.as_str()
                };
                source.metadata.insert(key.to_string(), value.clone());
            }
        }

        Ok(source)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn source() -> VariantSource {
        let mut source = VariantSource::new("f1", "file1.vcf", "s1", "study1");
        source.study_type = StudyType::Family;
        source.set_sample_names(&["NA001", "NA002", "NA003"]);
        source.stats = Some(VariantGlobalStats {
            samples_count: 3,
            variants_count: 10,
            snps_count: 8,
            indels_count: 2,
            pass_count: 9,
            transitions_count: 5,
            transversions_count: 3,
            mean_quality: 50.5,
            ..Default::default()
        });
        source
            .metadata
            .insert(String::from(VARIANT_FILE_HEADER), json!("##fileformat=VCFv4.1"));
        source
            .metadata
            .insert(String::from("source"), json!({"name": "caller", "version": 2}));
        source
    }

    #[test]
    fn encode() {
        let document = SourceCodec.encode(&source());

        assert_eq!(document["_id"], json!("s1_f1"));
        assert_eq!(document["stype"], json!("FAMILY"));
        assert_eq!(document["samp"], json!({"NA001": 0, "NA002": 1, "NA003": 2}));
        assert_eq!(document["st"]["nVar"], json!(10));
        assert_eq!(document["st"]["meanQ"], json!(50.5));
        assert_eq!(document["meta"]["header"], json!("##fileformat=VCFv4.1"));
        assert!(document["date"].is_string());
    }

    #[test]
    fn round_trip() -> Result<(), anyhow::Error> {
        let source = source();

        assert_eq!(SourceCodec.decode(&SourceCodec.encode(&source))?, source);

        Ok(())
    }

    #[test]
    fn build_id() {
        insta::assert_snapshot!(build_source_id("s1", "f1"), @"s1_f1");
    }
}
