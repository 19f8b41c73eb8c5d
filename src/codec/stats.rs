//! Per-cohort statistics, stored in the `st` list of variant documents.

use serde_json::Value;

use super::{genotype_from_storage, genotype_to_storage, get_f64, get_i32, get_string, Error};
use crate::{
    model::{Variant, VariantSourceEntry, VariantStats},
    storage::Document,
};

pub const COHORT_ID_FIELD: &str = "cid";
pub const STUDY_ID_FIELD: &str = "sid";
pub const FILE_ID_FIELD: &str = "fid";
pub const MAF_FIELD: &str = "maf";
pub const MGF_FIELD: &str = "mgf";
pub const MAF_ALLELE_FIELD: &str = "mafAl";
pub const MGF_GENOTYPE_FIELD: &str = "mgfGt";
pub const MISSING_ALLELES_FIELD: &str = "missAl";
pub const MISSING_GENOTYPES_FIELD: &str = "missGt";
pub const NUM_GT_FIELD: &str = "numGt";

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsCodec;

impl StatsCodec {
    pub fn encode(&self, stats: &VariantStats) -> Document {
        let mut document = Document::new();
        document.insert(MAF_FIELD.into(), Value::from(stats.maf as f64));
        document.insert(MGF_FIELD.into(), Value::from(stats.mgf as f64));
        document.insert(MAF_ALLELE_FIELD.into(), Value::from(stats.maf_allele.as_str()));
        document.insert(
            MGF_GENOTYPE_FIELD.into(),
            Value::from(stats.mgf_genotype.as_str()),
        );
        document.insert(
            MISSING_ALLELES_FIELD.into(),
            Value::from(stats.missing_alleles),
        );
        document.insert(
            MISSING_GENOTYPES_FIELD.into(),
            Value::from(stats.missing_genotypes),
        );
        document.insert(
            NUM_GT_FIELD.into(),
            Value::Object(
                stats
                    .genotypes_count
                    .iter()
                    .map(|(gt, count)| (genotype_to_storage(gt), Value::from(*count)))
                    .collect(),
            ),
        );
        document
    }

    /// Entries of the `st` list for all cohorts of `entry`.
    pub fn encode_cohort_stats(&self, entry: &VariantSourceEntry) -> Vec<Value> {
        self.encode_cohorts(
            entry.cohort_stats.iter(),
            &entry.study_id,
            &entry.file_id,
        )
    }

    /// Entries of the `st` list for the given cohorts.
    pub fn encode_cohorts<'a, I>(&self, cohorts: I, study_id: &str, file_id: &str) -> Vec<Value>
    where
        I: Iterator<Item = (&'a String, &'a VariantStats)>,
    {
        cohorts
            .map(|(cohort_id, stats)| {
                let mut document = self.encode(stats);
                document.insert(COHORT_ID_FIELD.into(), Value::from(cohort_id.as_str()));
                document.insert(STUDY_ID_FIELD.into(), Value::from(study_id));
                document.insert(FILE_ID_FIELD.into(), Value::from(file_id));
                Value::Object(document)
            })
            .collect()
    }

    pub fn decode(&self, document: &Document) -> Result<VariantStats, Error> {
        let genotypes_count = match document.get(NUM_GT_FIELD) {
            Some(Value::Object(counts)) => counts
                .keys()
                .map(|gt| -> Result<_, Error> {
                    Ok((genotype_from_storage(gt), get_i32(counts, gt, 0)?))
                })
                .collect::<Result<_, Error>>()?,
            _ => Default::default(),
        };
        Ok(VariantStats {
            maf: get_f64(document, MAF_FIELD, -1.0) as f32,
            mgf: get_f64(document, MGF_FIELD, -1.0) as f32,
            maf_allele: get_string(document, MAF_ALLELE_FIELD),
            mgf_genotype: get_string(document, MGF_GENOTYPE_FIELD),
            missing_alleles: get_i32(document, MISSING_ALLELES_FIELD, -1)?,
            missing_genotypes: get_i32(document, MISSING_GENOTYPES_FIELD, -1)?,
            genotypes_count,
            ..Default::default()
        })
    }

    /// Attach the cohort statistics in `list` to the matching source entries of `variant`.
    pub fn decode_cohort_stats(&self, list: &[Value], variant: &mut Variant) -> Result<(), Error> {
        for document in list.iter().filter_map(|value| value.as_object()) {
            let cohort_id = get_string(document, COHORT_ID_FIELD);
            let study_id = get_string(document, STUDY_ID_FIELD);
            let file_id = get_string(document, FILE_ID_FIELD);
            if study_id.is_empty() || file_id.is_empty() {
                tracing::error!(
                    "statistics of cohort {:?} of variant {}:{} lack study or file id",
                    &cohort_id,
                    &variant.chromosome,
                    variant.start
                );
                continue;
            }

            let mut stats = self.decode(document)?;
            stats.ref_allele = variant.reference.clone();
            stats.alt_allele = variant.alternate.clone();
            stats.variant_type = variant.variant_type;
            match variant.source_entry_mut(&file_id, &study_id) {
                Some(entry) => {
                    entry.cohort_stats.insert(cohort_id, stats);
                }
                None => tracing::warn!(
                    "no source entry for study {:?} file {:?} to attach statistics of cohort {:?}",
                    &study_id,
                    &file_id,
                    &cohort_id
                ),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use float_cmp::approx_eq;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tracing_test::traced_test;

    use super::*;

    fn stats() -> VariantStats {
        VariantStats {
            ref_allele: String::from("A"),
            alt_allele: String::from("C"),
            maf: 0.1,
            mgf: 0.01,
            maf_allele: String::from("A"),
            mgf_genotype: String::from("A/A"),
            missing_alleles: 10,
            missing_genotypes: 5,
            genotypes_count: [("0/0", 100), ("0/1", 50), ("1/1", 10)]
                .into_iter()
                .map(|(gt, n)| (gt.to_string(), n))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn encode() {
        let document = StatsCodec.encode(&stats());

        assert!(approx_eq!(
            f64,
            document[MAF_FIELD].as_f64().unwrap_or_default(),
            0.1,
            epsilon = 1e-6
        ));
        assert_eq!(document[MAF_ALLELE_FIELD], json!("A"));
        assert_eq!(document[MISSING_GENOTYPES_FIELD], json!(5));
        assert_eq!(
            document[NUM_GT_FIELD],
            json!({"0/0": 100, "0/1": 50, "1/1": 10})
        );
    }

    #[test]
    fn decode() -> Result<(), anyhow::Error> {
        let document = json!({
            "maf": 0.1, "mgf": 0.01, "mafAl": "A", "mgfGt": "A/A",
            "missAl": 10, "missGt": 5, "numGt": {"0/0": 100, "0/1": 50, "1/1": 10}
        });
        let decoded = StatsCodec.decode(document.as_object().unwrap())?;

        assert!(approx_eq!(f32, decoded.maf, 0.1, ulps = 2));
        assert!(approx_eq!(f32, decoded.mgf, 0.01, ulps = 2));
        assert_eq!(decoded.genotypes_count, stats().genotypes_count);
        assert_eq!(decoded.missing_alleles, 10);

        Ok(())
    }

    #[test]
    fn oversized_genotype_count_is_an_error() {
        let document = json!({"numGt": {"0/0": 3_000_000_000_i64, "0/1": 5}});

        assert!(matches!(
            StatsCodec.decode(document.as_object().unwrap()),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn missing_genotype_keys() -> Result<(), anyhow::Error> {
        let mut stats = stats();
        stats.genotypes_count.insert(String::from("./."), 3);

        let document = StatsCodec.encode(&stats);
        assert_eq!(document[NUM_GT_FIELD]["-1/-1"], json!(3));
        assert_eq!(
            StatsCodec.decode(&document)?.genotypes_count.get("./."),
            Some(&3)
        );

        Ok(())
    }

    #[test]
    fn attaches_to_source_entries() -> Result<(), anyhow::Error> {
        let mut variant = Variant::new("1", 1000, 1000, "A", "C");
        let mut entry = VariantSourceEntry::new("f1", "s1");
        entry.cohort_stats.insert(String::from("ALL"), stats());
        let list = StatsCodec.encode_cohort_stats(&entry);
        variant.add_source_entry(VariantSourceEntry::new("f1", "s1"));

        StatsCodec.decode_cohort_stats(&list, &mut variant)?;

        let cohort_stats = variant
            .source_entry("f1", "s1")
            .map(|e| e.cohort_stats.clone())
            .unwrap_or_default();
        let decoded = &cohort_stats["ALL"];
        assert_eq!(decoded.ref_allele, "A");
        assert_eq!(decoded.alt_allele, "C");
        assert_eq!(decoded.mgf_genotype, "A/A");

        Ok(())
    }

    #[traced_test]
    #[test]
    fn unknown_source_entry_is_skipped() -> Result<(), anyhow::Error> {
        let mut variant = Variant::new("1", 1000, 1000, "A", "C");
        let mut entry = VariantSourceEntry::new("f9", "s1");
        entry.cohort_stats.insert(String::from("ALL"), stats());

        StatsCodec.decode_cohort_stats(&StatsCodec.encode_cohort_stats(&entry), &mut variant)?;

        assert!(variant.source_entries.is_empty());
        assert!(logs_contain("no source entry"));

        Ok(())
    }
}
