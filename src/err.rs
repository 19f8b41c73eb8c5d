use std::num::ParseIntError;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    #[error("Invalid format in region: {0:?}")]
    RegionInvalidFormat(String),
    #[error("Invalid integer coordinates in region")]
    RegionInvalidInts(#[from] ParseIntError),
    #[error("Invalid query option, expected key=value: {0:?}")]
    OptionInvalidFormat(String),
}
