//! Population statistics parameters.

use crate::{
    codec::{genotype_to_storage, stats as fields, variant::STATS_FIELD},
    query::{keys, Comparator, Error, QueryOptions},
    storage::Filter,
};

pub fn apply(options: &QueryOptions) -> Result<Vec<Filter>, Error> {
    let mut result = Vec::new();

    for (key, field) in [
        (keys::MAF, fields::MAF_FIELD),
        (keys::MGF, fields::MGF_FIELD),
        (keys::MISSING_ALLELES, fields::MISSING_ALLELES_FIELD),
        (keys::MISSING_GENOTYPES, fields::MISSING_GENOTYPES_FIELD),
    ] {
        if let Some(expr) = options.get_str(key).filter(|e| !e.is_empty()) {
            let path = format!("{}.{}", STATS_FIELD, field);
            result.push(expr.parse::<Comparator>()?.to_filter(&path));
        }
    }

    for entry in options.get_list(keys::NUMGT) {
        match entry.split_once(':') {
            Some((genotype, expr)) => {
                let path = format!(
                    "{}.{}.{}",
                    STATS_FIELD,
                    fields::NUM_GT_FIELD,
                    genotype_to_storage(genotype)
                );
                result.push(expr.parse::<Comparator>()?.to_filter(&path));
            }
            None => tracing::warn!("ignoring genotype count filter without genotype: {:?}", &entry),
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
    fn frequencies() -> Result<(), anyhow::Error> {
        let filters = apply(
            &QueryOptions::new()
                .with("maf", "<=0.1")
                .with("mgf", "")
                .with("missing_alleles", "<5")
                .with("missing_genotypes", "==0"),
        )?;

        assert_eq!(
            filters,
            vec![
                Filter::Lte(String::from("st.maf"), 0.1),
                Filter::Lt(String::from("st.missAl"), 5.0),
                Filter::Eq(String::from("st.missGt"), json!(0.0)),
            ]
        );

        Ok(())
    }

    #[test]
    fn genotype_counts() -> Result<(), anyhow::Error> {
        let filters = apply(&QueryOptions::new().with("numgt", "0/1:>10,./.:<3"))?;

        assert_eq!(
            filters,
            vec![
                Filter::Gt(String::from("st.numGt.0/1"), 10.0),
                Filter::Lt(String::from("st.numGt.-1/-1"), 3.0),
            ]
        );
        assert!(filters[0].matches(&json!({"st": [{"numGt": {"0/1": 50}}]})));

        Ok(())
    }

    #[test]
    fn unknown_operator_fails() {
        assert!(apply(&QueryOptions::new().with("maf", "~0.1")).is_err());
    }
}
