//! Per-cohort variant statistics.

use indexmap::IndexMap;

use super::VariantType;

/// Allele and genotype statistics of one cohort.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariantStats {
    /// Reference allele, copied from the variant.
    #[serde(default)]
    pub ref_allele: String,
    /// Alternate allele, copied from the variant.
    #[serde(default)]
    pub alt_allele: String,
    /// Variant type, copied from the variant.
    #[serde(default)]
    pub variant_type: VariantType,
    /// Minor allele frequency.
    pub maf: f32,
    /// Minor genotype frequency.
    pub mgf: f32,
    /// The minor allele.
    pub maf_allele: String,
    /// The minor genotype.
    pub mgf_genotype: String,
    /// Number of missing alleles.
    pub missing_alleles: i32,
    /// Number of missing genotypes.
    pub missing_genotypes: i32,
    /// Genotype counts, using `.` for missing alleles, e.g., `0/.`.
    #[serde(default)]
    pub genotypes_count: IndexMap<String, i32>,
}

/// Cohort statistics of one variant, addressed by coordinates, as used in stats updates.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariantStatsWrapper {
    pub chromosome: String,
    pub position: i32,
    pub reference: String,
    pub alternate: String,
    /// Statistics by cohort.
    pub cohort_stats: IndexMap<String, VariantStats>,
}
