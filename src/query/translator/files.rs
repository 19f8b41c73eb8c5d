//! Study, file and per-sample genotype parameters.
//!
//! All conditions apply to the same element of `files`, so they are combined into a
//! single `elemMatch`.  Genotype conditions only see samples listed under an explicit
//! genotype key; samples folded into the default genotype `def` are not matched.

use crate::{
    codec::{genotype_to_storage, source_entry as fields, variant::FILES_FIELD},
    query::{keys, QueryOptions},
    storage::Filter,
};

pub fn apply(options: &QueryOptions) -> Vec<Filter> {
    let mut conditions = Vec::new();

    let studies = options.get_list(keys::STUDIES);
    if !studies.is_empty() {
        conditions.push(Filter::eq_or_in(fields::STUDY_ID_FIELD, studies));
    }

    let files = options.get_list(keys::FILES);
    if !files.is_empty() {
        conditions.push(Filter::eq_or_in(fields::FILE_ID_FIELD, files));
    }

    if let Some(genotypes) = options.get_str(keys::GENOTYPE) {
        conditions.extend(genotype_filters(&genotypes));
    }

    if conditions.is_empty() {
        Vec::new()
    } else {
        vec![Filter::elem_match(FILES_FIELD, Filter::and(conditions))]
    }
}

/// Parse `idx:gt[,gt]*(;idx:gt[,gt]*)*` into one disjunction per sample.
fn genotype_filters(expr: &str) -> Vec<Filter> {
    let mut result = Vec::new();
    for segment in expr.split(';').filter(|s| !s.trim().is_empty()) {
        let Some((sample, genotypes)) = segment.split_once(':') else {
            tracing::warn!("ignoring malformed genotype filter {:?}", segment);
            continue;
        };
        let Ok(sample) = sample.trim().parse::<i64>() else {
            tracing::warn!("ignoring genotype filter with bad sample index {:?}", segment);
            continue;
        };
        let alternatives = genotypes
            .split(',')
            .map(|gt| gt.trim())
            .filter(|gt| !gt.is_empty())
            .map(|gt| {
                Filter::eq(
                    &format!("{}.{}", fields::SAMPLES_FIELD, genotype_to_storage(gt)),
                    sample,
                )
            })
            .collect::<Vec<_>>();
        if !alternatives.is_empty() {
            result.push(Filter::or(alternatives));
        }
    }
    result
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tracing_test::traced_test;

    use super::*;

    #[test]
    fn studies_and_files_share_one_element() {
        let filters = apply(&QueryOptions::new().with("studies", "s1").with("files", "f1,f2"));

        assert_eq!(
            filters,
            vec![Filter::elem_match(
                "files",
                Filter::And(vec![
                    Filter::eq("sid", "s1"),
                    Filter::is_in("fid", vec!["f1", "f2"]),
                ])
            )]
        );
        assert!(filters[0].matches(&json!({"files": [{"sid": "s1", "fid": "f2"}]})));
        assert!(!filters[0].matches(&json!({"files": [{"sid": "s1", "fid": "f3"}, {"sid": "s2", "fid": "f1"}]})));
    }

    #[traced_test]
    #[test]
    fn genotypes() {
        let filters = apply(&QueryOptions::new().with("genotype", "1:0/1,1/1;2:./.;x:0/1;junk"));

        assert_eq!(
            filters,
            vec![Filter::elem_match(
                "files",
                Filter::And(vec![
                    Filter::Or(vec![Filter::eq("samp.0/1", 1), Filter::eq("samp.1/1", 1)]),
                    Filter::eq("samp.-1/-1", 2),
                ])
            )]
        );
        assert!(logs_contain("bad sample index"));
        assert!(logs_contain("malformed genotype filter"));

        let document = json!({"files": [{"samp": {"def": "0/0", "1/1": [1], "-1/-1": [2]}}]});
        assert!(filters[0].matches(&document));
        let document = json!({"files": [{"samp": {"def": "0/0", "0/1": [2]}}]});
        assert!(!filters[0].matches(&document));
    }

    #[test]
    fn nothing_requested() {
        assert!(apply(&QueryOptions::new()).is_empty());
    }
}
