//! The `Variant` record.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

use super::{VariantAnnotation, VariantSourceEntry};

/// Alleles of at least this length make a variant structural and are hashed in storage ids.
pub const SV_THRESHOLD: usize = 50;

/// Variant type as derived from the allele shapes.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum VariantType {
    /// Single nucleotide variant.
    #[default]
    Snv,
    /// Multi-nucleotide variant (same length, more than one base).
    Mnv,
    /// Insertion or deletion below the structural threshold.
    Indel,
    /// Structural variant.
    Sv,
}

impl VariantType {
    /// Derive the type from reference and alternate allele.
    pub fn from_alleles(reference: &str, alternate: &str) -> Self {
        let ref_len = allele_len(reference);
        let alt_len = allele_len(alternate);
        if ref_len == alt_len {
            if ref_len > 1 {
                VariantType::Mnv
            } else {
                VariantType::Snv
            }
        } else if ref_len.max(alt_len) >= SV_THRESHOLD {
            VariantType::Sv
        } else {
            VariantType::Indel
        }
    }
}

/// Length of an allele where the `-` placeholder counts as empty.
pub fn allele_len(allele: &str) -> usize {
    if allele == "-" {
        0
    } else {
        allele.len()
    }
}

/// A genomic variant with all per-file contributions.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Variant {
    /// Chromosome name.
    pub chromosome: String,
    /// 1-based start position.
    pub start: i32,
    /// 1-based end position.
    pub end: i32,
    /// Length of the longer allele.
    pub length: i32,
    /// Reference allele.
    pub reference: String,
    /// Alternate allele.
    pub alternate: String,
    /// Variant type.
    #[serde(rename = "type")]
    pub variant_type: VariantType,
    /// External identifiers, e.g., dbSNP.
    #[serde(default)]
    pub ids: BTreeSet<String>,
    /// HGVS names by nomenclature type.
    #[serde(default)]
    pub hgvs: BTreeMap<String, BTreeSet<String>>,
    /// Per-file contributions, keyed by `<studyId>_<fileId>`.
    #[serde(default)]
    pub source_entries: IndexMap<String, VariantSourceEntry>,
    /// Functional annotation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<VariantAnnotation>,
}

impl Variant {
    /// Construct with the given coordinates, deriving length, type, and the genomic
    /// HGVS name of SNVs.
    pub fn new(chromosome: &str, start: i32, end: i32, reference: &str, alternate: &str) -> Self {
        let length = allele_len(reference).max(allele_len(alternate)) as i32;
        let variant_type = VariantType::from_alleles(reference, alternate);
        let mut hgvs = BTreeMap::new();
        if variant_type == VariantType::Snv {
            hgvs.insert(
                String::from("genomic"),
                BTreeSet::from([format!(
                    "{}:g.{}{}>{}",
                    chromosome, start, reference, alternate
                )]),
            );
        }

        Self {
            chromosome: chromosome.to_string(),
            start,
            end,
            length,
            reference: reference.to_string(),
            alternate: alternate.to_string(),
            variant_type,
            ids: BTreeSet::new(),
            hgvs,
            source_entries: IndexMap::new(),
            annotation: None,
        }
    }

    /// Add one HGVS name of the given type.
    pub fn add_hgvs(&mut self, hgvs_type: &str, name: &str) {
        self.hgvs
            .entry(hgvs_type.to_string())
            .or_default()
            .insert(name.to_string());
    }

    /// Add a source entry, replacing one for the same study and file.
    pub fn add_source_entry(&mut self, entry: VariantSourceEntry) {
        self.source_entries.insert(entry.key(), entry);
    }

    /// Source entry of the given file and study.
    pub fn source_entry(&self, file_id: &str, study_id: &str) -> Option<&VariantSourceEntry> {
        self.source_entries
            .get(&VariantSourceEntry::build_key(study_id, file_id))
    }

    /// Mutable source entry of the given file and study.
    pub fn source_entry_mut(
        &mut self,
        file_id: &str,
        study_id: &str,
    ) -> Option<&mut VariantSourceEntry> {
        self.source_entries
            .get_mut(&VariantSourceEntry::build_key(study_id, file_id))
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[rstest::rstest]
    #[case("A", "C", VariantType::Snv)]
    #[case("AC", "GT", VariantType::Mnv)]
    #[case("", "CA", VariantType::Indel)]
    #[case("-", "CA", VariantType::Indel)]
    #[case("A", "ACGT", VariantType::Indel)]
    #[case("T", &"A".repeat(60), VariantType::Sv)]
    fn variant_type_from_alleles(
        #[case] reference: &str,
        #[case] alternate: &str,
        #[case] expected: VariantType,
    ) {
        assert_eq!(VariantType::from_alleles(reference, alternate), expected);
    }

    #[test]
    fn new_snv_has_genomic_hgvs() {
        let variant = Variant::new("1", 1000, 1000, "A", "C");

        assert_eq!(variant.length, 1);
        assert_eq!(variant.variant_type, VariantType::Snv);
        assert_eq!(
            variant.hgvs.get("genomic"),
            Some(&BTreeSet::from([String::from("1:g.1000A>C")]))
        );
    }

    #[test]
    fn source_entries_keyed_by_study_and_file() {
        let mut variant = Variant::new("1", 1000, 1000, "A", "C");
        variant.add_source_entry(VariantSourceEntry::new("f1", "s1"));
        variant.add_source_entry(VariantSourceEntry::new("f2", "s1"));
        variant.add_source_entry(VariantSourceEntry::new("f1", "s1"));

        assert_eq!(variant.source_entries.len(), 2);
        assert!(variant.source_entry("f2", "s1").is_some());
        assert!(variant.source_entry("f2", "s2").is_none());
    }

    #[test]
    fn variant_type_display() {
        assert_eq!(format!("{}", VariantType::Indel), "INDEL");
        assert_eq!("SV".parse::<VariantType>().ok(), Some(VariantType::Sv));
    }
}
