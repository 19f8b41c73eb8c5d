//! Identifiers, genomic coordinates and allele parameters.

use crate::{
    chunks::{regions_filter, Region},
    codec::{annotation, variant},
    query::{keys, Error, QueryOptions},
    storage::Filter,
};

/// Path of cross-reference ids in variant documents.
pub(super) fn xref_id_path() -> String {
    format!(
        "{}.{}.{}",
        variant::ANNOTATION_FIELD,
        annotation::XREFS_FIELD,
        annotation::XREF_ID_FIELD
    )
}

pub fn apply(options: &QueryOptions) -> Result<Vec<Filter>, Error> {
    let mut result = Vec::new();

    let ids = options.get_list(keys::ID);
    if !ids.is_empty() {
        result.push(Filter::or(vec![
            Filter::eq_or_in(&xref_id_path(), ids.clone()),
            Filter::eq_or_in(variant::IDS_FIELD, ids),
        ]));
    }

    let regions = options
        .get_list(keys::REGION)
        .iter()
        .map(|region| region.parse::<Region>())
        .collect::<Result<Vec<_>, _>>()?;
    if !regions.is_empty() {
        result.push(regions_filter(&regions));
    }

    let genes = options.get_list(keys::GENE);
    if !genes.is_empty() {
        result.push(Filter::eq_or_in(&xref_id_path(), genes));
    }

    let chromosomes = options.get_list(keys::CHROMOSOME);
    if !chromosomes.is_empty() {
        result.push(Filter::eq_or_in(variant::CHROMOSOME_FIELD, chromosomes));
    }

    for (key, field) in [
        (keys::TYPE, variant::TYPE_FIELD),
        (keys::REFERENCE, variant::REFERENCE_FIELD),
        (keys::ALTERNATE, variant::ALTERNATE_FIELD),
    ] {
        if let Some(value) = options.get_str(key).filter(|v| !v.is_empty()) {
            let values = value.split(',').map(|s| s.to_string()).collect();
            result.push(Filter::eq_or_in(field, values));
        }
    }

    Ok(result)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn id_matches_ids_or_xrefs() -> Result<(), anyhow::Error> {
        let filters = apply(&QueryOptions::new().with("id", "rs666"))?;

        assert_eq!(
            filters,
            vec![Filter::Or(vec![
                Filter::eq("annot.xrefs.id", "rs666"),
                Filter::eq("ids", "rs666"),
            ])]
        );
        assert!(filters[0].matches(&json!({"ids": ["rs666"]})));
        assert!(filters[0].matches(&json!({"annot": {"xrefs": [{"id": "rs666"}]}})));

        Ok(())
    }

    #[test]
    fn gene_and_chromosome_lists() -> Result<(), anyhow::Error> {
        let filters = apply(
            &QueryOptions::new()
                .with("gene", "BRCA1,BRCA2")
                .with("chromosome", "X"),
        )?;

        assert_eq!(
            filters,
            vec![
                Filter::is_in("annot.xrefs.id", vec!["BRCA1", "BRCA2"]),
                Filter::eq("chr", "X"),
            ]
        );

        Ok(())
    }

    #[test]
    fn alleles_and_type() -> Result<(), anyhow::Error> {
        let filters = apply(
            &QueryOptions::new()
                .with("type", "SNV,INDEL")
                .with("reference", "A")
                .with("alternate", ""),
        )?;

        assert_eq!(
            filters,
            vec![
                Filter::is_in("type", vec!["SNV", "INDEL"]),
                Filter::eq("ref", "A"),
            ]
        );

        Ok(())
    }

    #[test]
    fn regions() -> Result<(), anyhow::Error> {
        let filters = apply(&QueryOptions::new().with("region", "1:1000-2000,2"))?;
        assert_eq!(filters.len(), 1);
        assert!(filters[0].matches(&json!({
            "chr": "1", "start": 1500, "end": 1500, "_at": {"chunkIds": ["1_1_1k", "1_0_10k"]}
        })));
        assert!(filters[0].matches(&json!({"chr": "2", "start": 5, "end": 5})));

        assert!(apply(&QueryOptions::new().with("region", "1:b-c")).is_err());

        Ok(())
    }
}
