//! Translation of named query parameters into store filters and projections.

pub mod comparator;
pub mod options;
pub mod projection;
pub mod translator;

pub use comparator::Comparator;
pub use options::QueryOptions;
pub use translator::QueryTranslator;

/// Names of the recognized query parameters.
pub mod keys {
    pub const ID: &str = "id";
    pub const REGION: &str = "region";
    pub const GENE: &str = "gene";
    pub const CHROMOSOME: &str = "chromosome";
    pub const TYPE: &str = "type";
    pub const REFERENCE: &str = "reference";
    pub const ALTERNATE: &str = "alternate";
    pub const ANNOTATION_EXISTS: &str = "annotation-exists";
    pub const ANNOT_XREF: &str = "annot-xref";
    pub const ANNOT_CONSEQUENCE_TYPE: &str = "annot-ct";
    pub const ANNOT_BIOTYPE: &str = "annot-biotype";
    pub const POLYPHEN: &str = "polyphen";
    pub const SIFT: &str = "sift";
    pub const PROTEIN_SUBSTITUTION: &str = "protein_substitution";
    pub const CONSERVED_REGION: &str = "conserved_region";
    pub const MAF: &str = "maf";
    pub const MGF: &str = "mgf";
    pub const MISSING_ALLELES: &str = "missing_alleles";
    pub const MISSING_GENOTYPES: &str = "missing_genotypes";
    pub const NUMGT: &str = "numgt";
    pub const STUDIES: &str = "studies";
    pub const FILES: &str = "files";
    pub const FILE_ID: &str = "fileId";
    pub const GENOTYPE: &str = "genotype";
    pub const INCLUDE: &str = "include";
    pub const EXCLUDE: &str = "exclude";
    pub const SORT: &str = "sort";
    pub const SKIP: &str = "skip";
    pub const LIMIT: &str = "limit";
    pub const COUNT: &str = "count";
    pub const MERGE: &str = "merge";
    pub const ORDER: &str = "order";
    pub const INTERVAL: &str = "interval";
    pub const STUDY_ID: &str = "studyId";
    pub const STUDY_NAME: &str = "studyName";
    pub const FILE_NAME: &str = "fileName";
}

/// Error type for query translation.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("unknown comparison operator {op:?} in {expr:?}")]
    UnknownOperator { op: String, expr: String },
    #[error("invalid number in comparison {0:?}")]
    InvalidNumber(String),
    #[error("invalid regular expression in comparison {expr:?}: {msg}")]
    InvalidRegex { expr: String, msg: String },
    #[error("invalid region: {0}")]
    InvalidRegion(#[from] crate::err::ArgError),
}
