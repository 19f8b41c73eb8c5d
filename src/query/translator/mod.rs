//! Translate `QueryOptions` into a store `Filter`.
//!
//! Each submodule handles one group of parameters and contributes conjuncts.  Some
//! passes clean up malformed list parameters and write the cleaned list back into the
//! options, which is why translation takes the options mutably.

mod annotation;
mod files;
mod stats;
mod variant;

use super::{Error, QueryOptions};
use crate::storage::Filter;

/// Translates query parameters for the variants collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryTranslator;

impl QueryTranslator {
    /// Build the filter for `options`; malformed list fragments are dropped.
    pub fn translate(&self, options: &mut QueryOptions) -> Result<Filter, Error> {
        let mut filters = Vec::new();
        filters.extend(variant::apply(options)?);
        filters.extend(annotation::apply(options)?);
        filters.extend(stats::apply(options)?);
        filters.extend(files::apply(options));

        let filter = Filter::and(filters);
        tracing::debug!("filter: {:?}", &filter);
        Ok(filter)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_options_match_all() -> Result<(), anyhow::Error> {
        assert_eq!(QueryTranslator.translate(&mut QueryOptions::new())?, Filter::All);
        Ok(())
    }

    #[test]
    fn groups_are_conjoined() -> Result<(), anyhow::Error> {
        let mut options = QueryOptions::new()
            .with("chromosome", "1")
            .with("maf", "<0.1")
            .with("studies", "s1");

        let filter = QueryTranslator.translate(&mut options)?;

        assert_eq!(
            filter,
            Filter::And(vec![
                Filter::eq("chr", "1"),
                Filter::Lt(String::from("st.maf"), 0.1),
                Filter::elem_match("files", Filter::eq("sid", "s1")),
            ])
        );

        Ok(())
    }

    #[test]
    fn bad_comparator_is_an_error() {
        let mut options = QueryOptions::new().with("polyphen", "<<0.1");

        assert!(QueryTranslator.translate(&mut options).is_err());
    }
}
