//! Conversion between the data model and stored documents.
//!
//! Documents use short field names (see `variant::VariantCodec::short_name`) and never
//! carry characters that would need escaping.  Decoding is lenient about missing fields
//! so that projected documents still decode; it is strict about coordinates that do not
//! fit the model's integer width.

use serde_json::Value;

use crate::storage::Document;

pub mod annotation;
pub mod samples;
pub mod source;
pub mod source_entry;
pub mod stats;
pub mod variant;

pub use annotation::AnnotationCodec;
pub use samples::SamplesCodec;
pub use source::SourceCodec;
pub use source_entry::{IncludeSrc, SourceEntryCodec};
pub use stats::StatsCodec;
pub use variant::VariantCodec;

/// Error type for codecs.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("value {value} of field {field} is out of range")]
    OutOfRange { field: String, value: String },
    #[error("field {field} has unexpected type: {value}")]
    UnexpectedType { field: String, value: Value },
    #[error("problem compressing source line: {0}")]
    Io(#[from] std::io::Error),
}

/// String at `key`, empty if missing; numbers are rendered.
pub(crate) fn get_string(document: &Document, key: &str) -> String {
    match document.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Narrow `value` read from `field` to `i32`.
pub(crate) fn to_i32(field: &str, value: i64) -> Result<i32, Error> {
    i32::try_from(value).map_err(|_| Error::OutOfRange {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Integer at `key` narrowed to `i32`, `default` if missing or empty.
///
/// Numbers stored as strings are parsed; other strings are a type error.
pub(crate) fn get_i32(document: &Document, key: &str, default: i32) -> Result<i32, Error> {
    match document.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => to_i32(key, i),
            None => Err(Error::OutOfRange {
                field: key.to_string(),
                value: n.to_string(),
            }),
        },
        Some(Value::String(s)) if s.trim().is_empty() => Ok(default),
        Some(Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(i) => to_i32(key, i),
            Err(_) => Err(Error::UnexpectedType {
                field: key.to_string(),
                value: Value::String(s.clone()),
            }),
        },
        Some(other) => Err(Error::UnexpectedType {
            field: key.to_string(),
            value: other.clone(),
        }),
    }
}

/// Floating point number at `key`, `default` if missing or unparsable.
pub(crate) fn get_f64(document: &Document, key: &str, default: f64) -> f64 {
    match document.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(Value::String(s)) => s.parse::<f64>().unwrap_or(default),
        _ => default,
    }
}

/// Object elements of the array at `key`.
pub(crate) fn get_objects<'a>(document: &'a Document, key: &str) -> Vec<&'a Document> {
    match document.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(|item| item.as_object()).collect(),
        _ => Vec::new(),
    }
}

/// Insert the string unless it is empty.
pub(crate) fn put_str(document: &mut Document, key: &str, value: &str) {
    if !value.is_empty() {
        document.insert(key.to_string(), Value::from(value));
    }
}

/// Insert the integer unless it is zero.
pub(crate) fn put_int(document: &mut Document, key: &str, value: i32) {
    if value != 0 {
        document.insert(key.to_string(), Value::from(value));
    }
}

/// Insert the list unless it is empty.
pub(crate) fn put_list(document: &mut Document, key: &str, values: Vec<Value>) {
    if !values.is_empty() {
        document.insert(key.to_string(), Value::Array(values));
    }
}

/// Genotype as used in field names: missing alleles `.` become `-1`.
pub fn genotype_to_storage(genotype: &str) -> String {
    genotype.replace('.', "-1")
}

/// Inverse of `genotype_to_storage`.
pub fn genotype_from_storage(genotype: &str) -> String {
    genotype.replace("-1", ".")
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn document() -> Document {
        json!({
            "small": 5, "big": 3_000_000_000_i64, "text": "x", "num": 1.5,
            "quoted": " 12", "quoted_big": "3000000000", "blank": "", "flag": true
        })
            .as_object()
            .cloned()
            .unwrap_or_default()
    }

    #[test]
    fn get_i32_narrows() -> Result<(), anyhow::Error> {
        assert_eq!(get_i32(&document(), "small", 0)?, 5);
        assert_eq!(get_i32(&document(), "missing", 7)?, 7);
        assert!(matches!(
            get_i32(&document(), "big", 0),
            Err(Error::OutOfRange { .. })
        ));
        Ok(())
    }

    #[test]
    fn get_i32_parses_numeric_strings() -> Result<(), anyhow::Error> {
        assert_eq!(get_i32(&document(), "quoted", 0)?, 12);
        assert_eq!(get_i32(&document(), "blank", 3)?, 3);
        assert!(matches!(
            get_i32(&document(), "quoted_big", 0),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            get_i32(&document(), "text", 0),
            Err(Error::UnexpectedType { .. })
        ));
        assert!(matches!(
            get_i32(&document(), "flag", 0),
            Err(Error::UnexpectedType { .. })
        ));
        Ok(())
    }

    #[test]
    fn getters_are_lenient() {
        assert_eq!(get_string(&document(), "text"), "x");
        assert_eq!(get_string(&document(), "small"), "5");
        assert_eq!(get_string(&document(), "missing"), "");
        assert_eq!(get_f64(&document(), "num", 0.0), 1.5);
        assert_eq!(get_f64(&document(), "text", 2.0), 2.0);
    }

    #[rstest::rstest]
    #[case("0/1", "0/1")]
    #[case("./.", "-1/-1")]
    #[case("0|.", "0|-1")]
    fn genotype_keys(#[case] genotype: &str, #[case] stored: &str) {
        assert_eq!(genotype_to_storage(genotype), stored);
        assert_eq!(genotype_from_storage(stored), genotype);
    }
}
