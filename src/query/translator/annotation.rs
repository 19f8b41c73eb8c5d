//! Annotation parameters: consequence types, biotypes, xrefs and scores.

use serde_json::Value;

use super::variant::xref_id_path;
use crate::{
    codec::{annotation as fields, variant::ANNOTATION_FIELD},
    query::{keys, Comparator, Error, QueryOptions},
    storage::Filter,
};

fn ct_path(field: &str) -> String {
    format!(
        "{}.{}.{}",
        ANNOTATION_FIELD,
        fields::CONSEQUENCE_TYPE_FIELD,
        field
    )
}

pub fn apply(options: &mut QueryOptions) -> Result<Vec<Filter>, Error> {
    let mut result = Vec::new();

    if let Some(exists) = options.get_bool(keys::ANNOTATION_EXISTS) {
        result.push(Filter::Exists(ANNOTATION_FIELD.to_string(), exists));
    }

    let xrefs = options.get_list(keys::ANNOT_XREF);
    if !xrefs.is_empty() {
        result.push(Filter::eq_or_in(&xref_id_path(), xrefs));
    }

    if options.contains_key(keys::ANNOT_CONSEQUENCE_TYPE) {
        let mut accessions = Vec::new();
        let mut cleaned = Vec::new();
        for token in options.get_list(keys::ANNOT_CONSEQUENCE_TYPE) {
            match token.trim_start_matches("SO:").parse::<i64>() {
                Ok(accession) => {
                    accessions.push(Value::from(accession));
                    cleaned.push(Value::from(token));
                }
                Err(e) => tracing::error!("dropping consequence type {:?}: {}", &token, e),
            }
        }
        options.put(keys::ANNOT_CONSEQUENCE_TYPE, cleaned);
        let path = ct_path(fields::SO_ACCESSION_FIELD);
        match accessions.len() {
            0 => (),
            1 => result.push(Filter::Eq(path, accessions.remove(0))),
            _ => result.push(Filter::In(path, accessions)),
        }
    }

    let biotypes = options.get_list(keys::ANNOT_BIOTYPE);
    if !biotypes.is_empty() {
        result.push(Filter::eq_or_in(&ct_path(fields::BIOTYPE_FIELD), biotypes));
    }

    for (key, field) in [
        (keys::POLYPHEN, fields::POLYPHEN_FIELD),
        (keys::SIFT, fields::SIFT_FIELD),
    ] {
        if let Some(expr) = options.get_str(key).filter(|e| !e.is_empty()) {
            let path = format!("{}.{}", ct_path(field), fields::SCORE_SCORE_FIELD);
            result.push(expr.parse::<Comparator>()?.to_filter(&path));
        }
    }

    for (key, path) in [
        (
            keys::PROTEIN_SUBSTITUTION,
            ct_path(fields::PROTEIN_SUBSTITUTION_SCORE_FIELD),
        ),
        (
            keys::CONSERVED_REGION,
            format!("{}.{}", ANNOTATION_FIELD, fields::CONSERVED_REGION_SCORE_FIELD),
        ),
    ] {
        if options.contains_key(key) {
            result.extend(score_filters(options, key, &path)?);
        }
    }

    Ok(result)
}

/// One `elemMatch` per well-formed `source:expr` entry of the list at `key`.
fn score_filters(
    options: &mut QueryOptions,
    key: &str,
    path: &str,
) -> Result<Vec<Filter>, Error> {
    let mut result = Vec::new();
    let mut cleaned = Vec::new();
    for entry in options.get_list(key) {
        let parts = entry.split(':').collect::<Vec<_>>();
        if let [source, expr] = parts.as_slice() {
            let comparator = expr.parse::<Comparator>()?;
            result.push(Filter::elem_match(
                path,
                Filter::and(vec![
                    Filter::eq(fields::SCORE_SOURCE_FIELD, *source),
                    comparator.to_filter(fields::SCORE_SCORE_FIELD),
                ]),
            ));
            cleaned.push(Value::from(entry.as_str()));
        } else {
            tracing::error!("bad score filter: {:?}", &entry);
        }
    }
    options.put(key, cleaned);
    Ok(result)
}
