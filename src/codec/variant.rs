//! Variant documents of the `variants` collection.
//!
//! Example of a stored variant with one source entry:
//!
//! ```text
//! {
//!   "_id": "1_1000_A_C",
//!   "type": "SNV", "chr": "1", "start": 1000, "end": 1000, "len": 1,
//!   "ref": "A", "alt": "C",
//!   "_at": {"chunkIds": ["1_1_1k", "1_0_10k"]},
//!   "hgvs": [{"type": "genomic", "name": "1:g.1000A>C"}],
//!   "ids": ["rs666"],
//!   "files": [{"fid": "f1", "sid": "s1", "fm": "GT", "samp": {"def": "0/0", "0/1": [1]}}],
//!   "st": [{"cid": "ALL", "sid": "s1", "fid": "f1", "maf": 0.1, ...}],
//!   "annot": {"ct": [...], "xrefs": [...]}
//! }
//! ```

use std::collections::BTreeSet;

use serde_json::Value;

use super::{
    get_i32, get_objects, get_string, AnnotationCodec, Error, SourceEntryCodec, StatsCodec,
};
use crate::{
    chunks::chunk_ids_for_start,
    common::sha1_hex,
    model::{variant::allele_len, Variant, VariantType, SV_THRESHOLD},
    storage::Document,
};

pub const ID_FIELD: &str = "_id";
pub const CHROMOSOME_FIELD: &str = "chr";
pub const START_FIELD: &str = "start";
pub const END_FIELD: &str = "end";
pub const LENGTH_FIELD: &str = "len";
pub const REFERENCE_FIELD: &str = "ref";
pub const ALTERNATE_FIELD: &str = "alt";
pub const IDS_FIELD: &str = "ids";
pub const HGVS_FIELD: &str = "hgvs";
pub const TYPE_FIELD: &str = "type";
pub const NAME_FIELD: &str = "name";
pub const FILES_FIELD: &str = "files";
pub const ANNOTATION_FIELD: &str = "annot";
pub const STATS_FIELD: &str = "st";
pub const AT_FIELD: &str = "_at";
pub const CHUNK_IDS_FIELD: &str = "chunkIds";

/// Data model field names and their stored short names.
pub static FIELDS: &[(&str, &str)] = &[
    ("chromosome", CHROMOSOME_FIELD),
    ("start", START_FIELD),
    ("end", END_FIELD),
    ("length", LENGTH_FIELD),
    ("reference", REFERENCE_FIELD),
    ("alternate", ALTERNATE_FIELD),
    ("alternative", ALTERNATE_FIELD),
    ("ids", IDS_FIELD),
    ("hgvs", HGVS_FIELD),
    ("type", TYPE_FIELD),
    ("sourceEntries", FILES_FIELD),
    ("sourceEntries.cohortStats", STATS_FIELD),
    ("annotation", ANNOTATION_FIELD),
];

/// Short name of a data model field.
pub fn short_name(field: &str) -> Option<&'static str> {
    FIELDS
        .iter()
        .find(|(long, _)| *long == field)
        .map(|(_, short)| *short)
}

/// Allele as it appears in storage ids.
fn storage_allele(allele: &str) -> String {
    if allele == "-" {
        String::new()
    } else if allele.len() < SV_THRESHOLD {
        allele.to_string()
    } else {
        sha1_hex(allele)
    }
}

/// Deterministic `_id` of a variant.
pub fn build_storage_id(chromosome: &str, start: i32, reference: &str, alternate: &str) -> String {
    format!(
        "{}_{}_{}_{}",
        chromosome,
        start,
        storage_allele(reference),
        storage_allele(alternate)
    )
}

#[derive(Debug, Clone, Default)]
pub struct VariantCodec {
    pub source_entry: Option<SourceEntryCodec>,
    pub stats: Option<StatsCodec>,
    annotation: AnnotationCodec,
}

impl VariantCodec {
    pub fn new(source_entry: Option<SourceEntryCodec>, stats: Option<StatsCodec>) -> Self {
        Self {
            source_entry,
            stats,
            annotation: AnnotationCodec,
        }
    }

    pub fn storage_id(&self, variant: &Variant) -> String {
        build_storage_id(
            &variant.chromosome,
            variant.start,
            &variant.reference,
            &variant.alternate,
        )
    }

    pub fn encode(&self, variant: &Variant) -> Result<Document, Error> {
        let mut document = Document::new();
        document.insert(ID_FIELD.into(), Value::from(self.storage_id(variant)));
        document.insert(
            TYPE_FIELD.into(),
            Value::from(variant.variant_type.to_string()),
        );
        document.insert(
            CHROMOSOME_FIELD.into(),
            Value::from(variant.chromosome.as_str()),
        );
        document.insert(START_FIELD.into(), Value::from(variant.start));
        document.insert(END_FIELD.into(), Value::from(variant.end));
        document.insert(LENGTH_FIELD.into(), Value::from(variant.length));
        document.insert(
            REFERENCE_FIELD.into(),
            Value::from(variant.reference.as_str()),
        );
        document.insert(
            ALTERNATE_FIELD.into(),
            Value::from(variant.alternate.as_str()),
        );

        let mut at = Document::new();
        at.insert(
            CHUNK_IDS_FIELD.into(),
            Value::from(chunk_ids_for_start(&variant.chromosome, variant.start)),
        );
        document.insert(AT_FIELD.into(), Value::Object(at));

        let hgvs = variant
            .hgvs
            .iter()
            .flat_map(|(hgvs_type, names)| {
                names.iter().map(move |name| {
                    let mut entry = Document::new();
                    entry.insert(TYPE_FIELD.into(), Value::from(hgvs_type.as_str()));
                    entry.insert(NAME_FIELD.into(), Value::from(name.as_str()));
                    Value::Object(entry)
                })
            })
            .collect::<Vec<_>>();
        document.insert(HGVS_FIELD.into(), Value::Array(hgvs));

        if let Some(codec) = &self.source_entry {
            let files = variant
                .source_entries
                .values()
                .map(|entry| codec.encode(entry).map(Value::Object))
                .collect::<Result<Vec<_>, _>>()?;
            document.insert(FILES_FIELD.into(), Value::Array(files));
        }

        if let Some(codec) = &self.stats {
            let stats = variant
                .source_entries
                .values()
                .flat_map(|entry| codec.encode_cohort_stats(entry))
                .collect::<Vec<_>>();
            document.insert(STATS_FIELD.into(), Value::Array(stats));
        }

        Ok(document)
    }

    pub fn decode(&self, document: &Document) -> Result<Variant, Error> {
        let chromosome = get_string(document, CHROMOSOME_FIELD);
        let start = get_i32(document, START_FIELD, 0)?;
        let end = get_i32(document, END_FIELD, start)?;
        let reference = get_string(document, REFERENCE_FIELD);
        let alternate = get_string(document, ALTERNATE_FIELD);

        let mut variant = Variant::new(&chromosome, start, end, &reference, &alternate);
        variant.variant_type = VariantType::from_alleles(&reference, &alternate);
        let length = allele_len(&reference).max(allele_len(&alternate)) as i32;
        variant.length = get_i32(document, LENGTH_FIELD, length)?;

        variant.ids = match document.get(IDS_FIELD) {
            Some(Value::Array(ids)) => ids
                .iter()
                .filter_map(|id| id.as_str().map(|s| s.to_string()))
                .collect(),
            _ => BTreeSet::new(),
        };

        variant.hgvs.clear();
        for hgvs in get_objects(document, HGVS_FIELD) {
            variant.add_hgvs(&get_string(hgvs, TYPE_FIELD), &get_string(hgvs, NAME_FIELD));
        }

        if let Some(codec) = &self.source_entry {
            for file in get_objects(document, FILES_FIELD) {
                variant.add_source_entry(codec.decode(file));
            }
        }

        if let Some(Value::Object(annot)) = document.get(ANNOTATION_FIELD) {
            let mut annotation = self.annotation.decode(annot)?;
            annotation.chromosome = variant.chromosome.clone();
            annotation.start = variant.start;
            annotation.reference_allele = variant.reference.clone();
            annotation.alternative_allele = variant.alternate.clone();
            variant.annotation = Some(annotation);
        }

        if let (Some(codec), Some(Value::Array(stats))) =
            (&self.stats, document.get(STATS_FIELD))
        {
            codec.decode_cohort_stats(stats, &mut variant)?;
        }

        Ok(variant)
    }
}
