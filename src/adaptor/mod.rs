//! Query and update entry points over the variants and files collections.

pub mod sources;
pub mod studies;
pub mod variants;

pub use sources::SourceDbAdaptor;
pub use studies::StudyDbAdaptor;
pub use variants::{FrequencyBin, GroupCount, VariantDbAdaptor};

use crate::{codec, iterator, query, storage};

/// Error type for the adaptors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid query: {0}")]
    Query(#[from] query::Error),
    #[error("problem accessing the store: {0}")]
    Storage(#[from] storage::Error),
    #[error("problem converting document: {0}")]
    Codec(#[from] codec::Error),
    #[error("problem reading results: {0}")]
    Results(#[from] iterator::Error),
}
