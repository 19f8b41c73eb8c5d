//! Per-file contribution to a variant, stored as an element of the `files` list.

use serde_json::Value;

use super::{get_string, Error, SamplesCodec};
use crate::{
    common::io::{gunzip_str, gzip_str},
    model::{source_entry::SRC_ATTRIBUTE, VariantSourceEntry},
    storage::Document,
};

pub const FILE_ID_FIELD: &str = "fid";
pub const STUDY_ID_FIELD: &str = "sid";
pub const ALTERNATES_FIELD: &str = "alts";
pub const ATTRIBUTES_FIELD: &str = "attrs";
pub const FORMAT_FIELD: &str = "fm";
pub const SAMPLES_FIELD: &str = "samp";

/// How much of the original input line to keep in the `src` attribute.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
    clap::ValueEnum,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IncludeSrc {
    #[default]
    No,
    #[serde(rename = "FIRST_8_COLUMNS")]
    #[strum(serialize = "FIRST_8_COLUMNS")]
    First8Columns,
    Full,
}

#[derive(Debug, Clone, Default)]
pub struct SourceEntryCodec {
    pub include_src: IncludeSrc,
    pub samples: Option<SamplesCodec>,
}

impl SourceEntryCodec {
    pub fn new(include_src: IncludeSrc, samples: Option<SamplesCodec>) -> Self {
        Self {
            include_src,
            samples,
        }
    }

    pub fn encode(&self, entry: &VariantSourceEntry) -> Result<Document, Error> {
        let mut document = Document::new();
        document.insert(FILE_ID_FIELD.into(), Value::from(entry.file_id.as_str()));
        document.insert(STUDY_ID_FIELD.into(), Value::from(entry.study_id.as_str()));
        if !entry.secondary_alternates.is_empty() {
            document.insert(
                ALTERNATES_FIELD.into(),
                Value::from(entry.secondary_alternates.clone()),
            );
        }

        let mut attrs = Document::new();
        for (key, value) in &entry.attributes {
            if key == SRC_ATTRIBUTE {
                let line = match self.include_src {
                    IncludeSrc::No => continue,
                    IncludeSrc::Full => value.clone(),
                    IncludeSrc::First8Columns => {
                        value.split('\t').take(8).collect::<Vec<_>>().join("\t")
                    }
                };
                attrs.insert(
                    key.clone(),
                    Value::from(base16ct::lower::encode_string(&gzip_str(&line)?)),
                );
            } else {
                attrs.insert(key.clone(), Value::from(value.as_str()));
            }
        }
        if !attrs.is_empty() {
            document.insert(ATTRIBUTES_FIELD.into(), Value::Object(attrs));
        }

        if let Some(samples) = &self.samples {
            document.insert(FORMAT_FIELD.into(), Value::from(entry.format.as_str()));
            document.insert(SAMPLES_FIELD.into(), Value::Object(samples.encode(entry)));
        }

        Ok(document)
    }

    pub fn decode(&self, document: &Document) -> VariantSourceEntry {
        let mut entry = VariantSourceEntry::new(
            &get_string(document, FILE_ID_FIELD),
            &get_string(document, STUDY_ID_FIELD),
        );

        if let Some(Value::Array(alternates)) = document.get(ALTERNATES_FIELD) {
            entry.secondary_alternates = alternates
                .iter()
                .map(|alt| match alt {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
        }

        if let Some(Value::Object(attrs)) = document.get(ATTRIBUTES_FIELD) {
            for key in attrs.keys() {
                let value = get_string(attrs, key);
                if key == SRC_ATTRIBUTE {
                    entry.add_attribute(key, &decode_src(&value));
                } else {
                    entry.add_attribute(key, &value);
                }
            }
        }

        if document.contains_key(FORMAT_FIELD) {
            entry.format = get_string(document, FORMAT_FIELD);
        }

        if let (Some(samples), Some(Value::Object(samp))) =
            (&self.samples, document.get(SAMPLES_FIELD))
        {
            for (name, data) in samples.decode(&entry.file_id, samp) {
                entry.add_sample_data(&name, data);
            }
        }

        entry
    }
}

/// Unpack a stored `src` attribute, keeping the raw value if it is not hex gzip.
fn decode_src(value: &str) -> String {
    let unpacked = base16ct::lower::decode_vec(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
        .and_then(|buf| gunzip_str(&buf));
    match unpacked {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!("could not unpack src attribute: {}", e);
            value.to_string()
        }
    }
}
