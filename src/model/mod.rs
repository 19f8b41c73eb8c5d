//! In-memory data model of variants, their per-file contributions, statistics and
//! annotation, as handed in by upstream producers and returned to query callers.

pub mod annotation;
pub mod result;
pub mod source;
pub mod source_entry;
pub mod stats;
pub mod variant;

pub use annotation::{ConsequenceType, Score, VariantAnnotation, Xref};
pub use result::QueryResult;
pub use source::{StudySummary, StudyType, VariantGlobalStats, VariantSource};
pub use source_entry::VariantSourceEntry;
pub use stats::{VariantStats, VariantStatsWrapper};
pub use variant::{Variant, VariantType, SV_THRESHOLD};
