//! Functional annotation of a variant.

use indexmap::IndexMap;

/// A score with its source, e.g., SIFT or PhastCons.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Score {
    pub score: f64,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub description: String,
}

impl Score {
    pub fn new(score: f64, source: &str, description: &str) -> Self {
        Self {
            score,
            source: source.to_string(),
            description: description.to_string(),
        }
    }
}

/// Cross-reference to an external database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Xref {
    pub id: String,
    pub src: String,
}

impl Xref {
    pub fn new(id: &str, src: &str) -> Self {
        Self {
            id: id.to_string(),
            src: src.to_string(),
        }
    }
}

/// Consequence of a variant on one transcript.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ConsequenceType {
    pub gene_name: String,
    pub ensembl_gene_id: String,
    pub ensembl_transcript_id: String,
    pub strand: String,
    pub biotype: String,
    pub relative_position: i32,
    pub c_dna_position: i32,
    pub cds_position: i32,
    pub aa_position: i32,
    pub aa_change: String,
    pub codon: String,
    /// Sequence Ontology term names, e.g., `missense_variant`.
    pub so_terms: Vec<String>,
    pub protein_substitution_scores: Vec<Score>,
}

/// Functional annotation of one variant.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VariantAnnotation {
    pub chromosome: String,
    pub start: i32,
    pub reference_allele: String,
    pub alternative_allele: String,
    /// Primary identifier, usually from dbSNP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub consequence_types: Vec<ConsequenceType>,
    pub conserved_region_scores: Vec<Score>,
    pub xrefs: Vec<Xref>,
    pub clinical_data: IndexMap<String, serde_json::Value>,
}
