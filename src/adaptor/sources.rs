//! Queries and updates of the source summaries in the files collection.

use std::{sync::Arc, time::Instant};

use serde_json::Value;

use super::Error;
use crate::{
    codec::{source as fields, SourceCodec},
    model::{QueryResult, VariantSource},
    query::{keys, QueryOptions},
    registry::SourceRegistry,
    storage::{DocumentStore, Filter, FindOptions, Update, UpdateOp, WriteResult},
};

pub struct SourceDbAdaptor {
    store: Arc<dyn DocumentStore>,
    collection: String,
    registry: Arc<SourceRegistry>,
}

impl std::fmt::Debug for SourceDbAdaptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDbAdaptor")
            .field("collection", &self.collection)
            .finish()
    }
}

impl SourceDbAdaptor {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str, registry: Arc<SourceRegistry>) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            registry,
        }
    }

    pub fn count_sources(&self) -> Result<QueryResult<u64>, Error> {
        let before = Instant::now();
        let count = self.store.count(&self.collection, &Filter::All)?;
        Ok(QueryResult::new("", before.elapsed(), vec![count]))
    }

    /// Sources matching `studyId`, `studyName`, `fileId` and `fileName`, each a value
    /// or a comma-separated list.
    pub fn get_all_sources(&self, options: &QueryOptions) -> Result<QueryResult<VariantSource>, Error> {
        let filter = Filter::and(
            [
                (keys::STUDY_ID, fields::STUDY_ID_FIELD),
                (keys::STUDY_NAME, fields::STUDY_NAME_FIELD),
                (keys::FILE_ID, fields::FILE_ID_FIELD),
                (keys::FILE_NAME, fields::FILE_NAME_FIELD),
            ]
            .into_iter()
            .filter_map(|(key, field)| {
                let values = options.get_list(key);
                (!values.is_empty()).then(|| Filter::eq_or_in(field, values))
            })
            .collect(),
        );

        let before = Instant::now();
        let sources = self
            .store
            .find(&self.collection, &filter, &FindOptions::default())?
            .map(|document| -> Result<VariantSource, Error> { Ok(SourceCodec.decode(&document?)?) })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QueryResult::new("", before.elapsed(), sources))
    }

    pub fn get_all_sources_by_study_ids(
        &self,
        study_ids: &[String],
        options: &QueryOptions,
    ) -> Result<QueryResult<VariantSource>, Error> {
        let options = options.clone().with(keys::STUDY_ID, study_ids.join(","));
        self.get_all_sources(&options)
    }

    /// Ordered sample names per file; unknown files give an empty list and a warning.
    pub fn get_samples_by_sources(
        &self,
        file_ids: &[String],
    ) -> Result<Vec<QueryResult<String>>, Error> {
        Ok(self.registry.get_samples_by_sources(file_ids)?)
    }

    /// Store the global stats of `source` in all summaries of its study and file.
    pub fn update_source_stats(&self, source: &VariantSource) -> Result<QueryResult<WriteResult>, Error> {
        let before = Instant::now();
        let Some(stats) = &source.stats else {
            let mut result = QueryResult::new(&source.file_id, before.elapsed(), Vec::new());
            result.add_warning(&format!("Source {} has no stats", &source.file_id));
            return Ok(result);
        };

        let op = UpdateOp::update_many(
            Filter::and(vec![
                Filter::eq(fields::FILE_ID_FIELD, source.file_id.as_str()),
                Filter::eq(fields::STUDY_ID_FIELD, source.study_id.as_str()),
            ]),
            Update::default().set(fields::STATS_FIELD, Value::Object(SourceCodec.encode_stats(stats))),
        );
        let write = self.store.update(&self.collection, &op)?;
        let mut result = QueryResult::new(&source.file_id, before.elapsed(), vec![write]);
        result.num_total_results = write.matched;
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use float_cmp::approx_eq;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{model::VariantGlobalStats, storage::MemoryStore};

    fn adaptor() -> Result<SourceDbAdaptor, anyhow::Error> {
        let store = Arc::new(MemoryStore::new());
        for (file_id, study_id, study_name) in [("f1", "s1", "first"), ("f2", "s1", "first"), ("f3", "s2", "second")] {
            let mut source = VariantSource::new(file_id, &format!("{}.vcf.gz", file_id), study_id, study_name);
            source.set_sample_names(&["NA001", "NA002"]);
            store.insert_if_absent("files", SourceCodec.encode(&source))?;
        }
        let registry = Arc::new(SourceRegistry::new(store.clone(), "files"));
        Ok(SourceDbAdaptor::new(store, "files", registry))
    }

    fn file_ids(result: &QueryResult<VariantSource>) -> Vec<&str> {
        let mut ids = result.result.iter().map(|s| s.file_id.as_str()).collect::<Vec<_>>();
        ids.sort();
        ids
    }

    #[test]
    fn count_and_filter() -> Result<(), anyhow::Error> {
        let adaptor = adaptor()?;

        assert_eq!(adaptor.count_sources()?.result, vec![3]);
        let all = adaptor.get_all_sources(&QueryOptions::new())?;
        assert_eq!(file_ids(&all), vec!["f1", "f2", "f3"]);
        let by_name = adaptor.get_all_sources(&QueryOptions::new().with("studyName", "second"))?;
        assert_eq!(file_ids(&by_name), vec!["f3"]);
        let by_file = adaptor.get_all_sources(&QueryOptions::new().with("fileName", "f1.vcf.gz,f3.vcf.gz"))?;
        assert_eq!(file_ids(&by_file), vec!["f1", "f3"]);
        let by_study = adaptor.get_all_sources_by_study_ids(&[String::from("s1")], &QueryOptions::new())?;
        assert_eq!(file_ids(&by_study), vec!["f1", "f2"]);
        assert_eq!(by_study.result[0].sample_names(), vec!["NA001", "NA002"]);

        Ok(())
    }

    #[test]
    fn samples_by_sources() -> Result<(), anyhow::Error> {
        let adaptor = adaptor()?;

        let results = adaptor.get_samples_by_sources(&[String::from("f2"), String::from("f9")])?;

        assert_eq!(results[0].result, vec!["NA001", "NA002"]);
        assert!(results[1].result.is_empty());
        assert_eq!(results[1].warning_msg, "Source f9 not found");

        Ok(())
    }

    #[test]
    fn update_stats_of_source() -> Result<(), anyhow::Error> {
        let adaptor = adaptor()?;
        let mut source = VariantSource::new("f2", "f2.vcf.gz", "s1", "first");
        source.stats = Some(VariantGlobalStats {
            variants_count: 12,
            mean_quality: 30.5,
            ..Default::default()
        });

        let result = adaptor.update_source_stats(&source)?;
        assert_eq!(result.num_total_results, 1);

        let stored = adaptor.get_all_sources(&QueryOptions::new().with("fileId", "f2"))?;
        let stats = stored.result[0]
            .stats
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no stats"))?;
        assert_eq!(stats.variants_count, 12);
        assert!(approx_eq!(f32, stats.mean_quality, 30.5, ulps = 2));

        let without = adaptor.update_source_stats(&VariantSource::new("f1", "f1.vcf.gz", "s1", "first"))?;
        assert_eq!(without.warning_msg, "Source f1 has no stats");

        Ok(())
    }
}
