//! Cache of the sample names of each loaded source file.
//!
//! Decoding per-sample genotypes needs the ordered sample names of the file a source
//! entry came from.  The registry keeps them in memory and rescans the whole files
//! collection when asked for a file it does not know.  Concurrent misses are funneled
//! through one refresh lock and re-check the cache after acquiring it, so a burst of
//! misses costs a single scan.  Files still absent after a rescan are remembered as
//! missing and do not trigger another one until the next `invalidate` or
//! `all_sample_names`.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, RwLock},
    time::Instant,
};

use serde_json::Value;

use crate::{
    codec::source as fields,
    model::QueryResult,
    storage::{DocumentStore, Error, Filter, FindOptions, Projection},
};

pub struct SourceRegistry {
    store: Arc<dyn DocumentStore>,
    collection: String,
    samples: RwLock<HashMap<String, Vec<String>>>,
    /// Files requested but not found by the last rescan.
    missing: RwLock<HashSet<String>>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("collection", &self.collection)
            .field("samples", &self.samples)
            .field("missing", &self.missing)
            .finish()
    }
}

impl SourceRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            samples: RwLock::new(HashMap::new()),
            missing: RwLock::new(HashSet::new()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Forget everything, the next lookup rescans.
    pub fn invalidate(&self) -> Result<(), Error> {
        self.samples
            .write()
            .map_err(|e| Error::Poisoned(e.to_string()))?
            .clear();
        self.missing
            .write()
            .map_err(|e| Error::Poisoned(e.to_string()))?
            .clear();
        Ok(())
    }

    /// Cached names of `file_ids`, or `None` if one of them is neither known nor
    /// remembered as missing.
    fn cached(&self, file_ids: &[String]) -> Result<Option<HashMap<String, Vec<String>>>, Error> {
        let samples = self
            .samples
            .read()
            .map_err(|e| Error::Poisoned(e.to_string()))?;
        let missing = self
            .missing
            .read()
            .map_err(|e| Error::Poisoned(e.to_string()))?;
        if file_ids
            .iter()
            .all(|id| samples.contains_key(id) || missing.contains(id))
        {
            Ok(Some(
                file_ids
                    .iter()
                    .filter_map(|id| samples.get(id).map(|names| (id.clone(), names.clone())))
                    .collect(),
            ))
        } else {
            Ok(None)
        }
    }

    /// Sample names per requested file; unknown files are absent from the result.
    pub fn sample_names(&self, file_ids: &[String]) -> Result<HashMap<String, Vec<String>>, Error> {
        if let Some(result) = self.cached(file_ids)? {
            return Ok(result);
        }

        {
            let _guard = self
                .refresh_lock
                .lock()
                .map_err(|e| Error::Poisoned(e.to_string()))?;
            if self.cached(file_ids)?.is_none() {
                self.refresh()?;
                let unknown = {
                    let samples = self
                        .samples
                        .read()
                        .map_err(|e| Error::Poisoned(e.to_string()))?;
                    file_ids
                        .iter()
                        .filter(|id| !samples.contains_key(*id))
                        .cloned()
                        .collect::<Vec<_>>()
                };
                self.missing
                    .write()
                    .map_err(|e| Error::Poisoned(e.to_string()))?
                    .extend(unknown);
            }
        }

        Ok(self.cached(file_ids)?.unwrap_or_default())
    }

    /// Sample names of all known files.
    pub fn all_sample_names(&self) -> Result<HashMap<String, Vec<String>>, Error> {
        {
            let _guard = self
                .refresh_lock
                .lock()
                .map_err(|e| Error::Poisoned(e.to_string()))?;
            self.refresh()?;
        }
        Ok(self
            .samples
            .read()
            .map_err(|e| Error::Poisoned(e.to_string()))?
            .clone())
    }

    /// One result per requested file, with a warning for unknown ones.
    pub fn get_samples_by_sources(
        &self,
        file_ids: &[String],
    ) -> Result<Vec<QueryResult<String>>, Error> {
        let before = Instant::now();
        let mut samples = self.sample_names(file_ids)?;
        let elapsed = before.elapsed();
        Ok(file_ids
            .iter()
            .map(|file_id| match samples.remove(file_id) {
                Some(names) => QueryResult::new(file_id, elapsed, names),
                None => {
                    let mut result = QueryResult::new(file_id, elapsed, Vec::new());
                    result.add_warning(&format!("Source {} not found", file_id));
                    result
                }
            })
            .collect())
    }

    /// Rescan the files collection.
    fn refresh(&self) -> Result<(), Error> {
        let before = Instant::now();
        let projection = Projection::default()
            .include(fields::FILE_ID_FIELD)
            .include(fields::SAMPLES_FIELD);
        let options = FindOptions {
            projection: Some(projection),
            ..Default::default()
        };

        let mut result = HashMap::new();
        for document in self.store.find(&self.collection, &Filter::All, &options)? {
            let document = document?;
            let Some(file_id) = document.get(fields::FILE_ID_FIELD).and_then(|v| v.as_str()) else {
                continue;
            };
            let mut positions = match document.get(fields::SAMPLES_FIELD) {
                Some(Value::Object(samples)) => samples
                    .iter()
                    .map(|(name, pos)| (pos.as_i64().unwrap_or(i64::MAX), name.clone()))
                    .collect::<Vec<_>>(),
                _ => Vec::new(),
            };
            positions.sort();
            result
                .entry(file_id.to_string())
                .or_insert_with(Vec::new)
                .extend(positions.into_iter().map(|(_, name)| name));
        }

        tracing::debug!(
            "read samples of {} sources in {:?}",
            result.len(),
            before.elapsed()
        );
        *self
            .samples
            .write()
            .map_err(|e| Error::Poisoned(e.to_string()))? = result;
        self.missing
            .write()
            .map_err(|e| Error::Poisoned(e.to_string()))?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;
    use crate::{codec::SourceCodec, model::VariantSource, storage::MemoryStore};

    fn store_with_source(file_id: &str, samples: &[&str]) -> Result<Arc<MemoryStore>, Error> {
        let store = Arc::new(MemoryStore::new());
        add_source(&store, file_id, samples)?;
        Ok(store)
    }

    fn add_source(store: &MemoryStore, file_id: &str, samples: &[&str]) -> Result<(), Error> {
        let mut source = VariantSource::new(file_id, "file.vcf", "s1", "study");
        source.set_sample_names(samples);
        store.insert_if_absent("files", SourceCodec.encode(&source))?;
        Ok(())
    }

    #[test]
    fn lookup_populates_cache() -> Result<(), anyhow::Error> {
        let store = store_with_source("f1", &["NA003", "NA001", "NA002"])?;
        let registry = SourceRegistry::new(store.clone(), "files");

        let results = registry.get_samples_by_sources(&[String::from("f1")])?;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].result, vec!["NA003", "NA001", "NA002"]);
        assert!(results[0].warning_msg.is_empty());

        Ok(())
    }

    #[traced_test]
    #[test]
    fn missing_source_gives_warning() -> Result<(), anyhow::Error> {
        let store = store_with_source("f1", &["NA001"])?;
        let registry = SourceRegistry::new(store, "files");

        let results =
            registry.get_samples_by_sources(&[String::from("f1"), String::from("f9")])?;

        assert_eq!(results.len(), 2);
        assert_eq!(results[1].id, "f9");
        assert!(results[1].result.is_empty());
        assert_eq!(results[1].warning_msg, "Source f9 not found");

        Ok(())
    }

    #[test]
    fn miss_triggers_rescan() -> Result<(), anyhow::Error> {
        let store = store_with_source("f1", &["NA001"])?;
        let registry = SourceRegistry::new(store.clone(), "files");
        assert_eq!(registry.sample_names(&[String::from("f1")])?.len(), 1);

        add_source(&store, "f2", &["NA002", "NA003"])?;
        let names = registry.sample_names(&[String::from("f2")])?;

        assert_eq!(names.get("f2"), Some(&vec![String::from("NA002"), String::from("NA003")]));

        Ok(())
    }

    #[test]
    fn missing_source_is_not_rescanned() -> Result<(), anyhow::Error> {
        let store = store_with_source("f1", &["NA001"])?;
        let registry = SourceRegistry::new(store.clone(), "files");
        assert!(registry.sample_names(&[String::from("f9")])?.is_empty());

        // remembered as missing, so a later load is only seen after invalidation
        add_source(&store, "f9", &["NA009"])?;
        assert!(registry.sample_names(&[String::from("f9")])?.is_empty());
        let names = registry.sample_names(&[String::from("f1"), String::from("f9")])?;
        assert_eq!(names.len(), 1);

        registry.invalidate()?;
        let names = registry.sample_names(&[String::from("f9")])?;
        assert_eq!(names.get("f9"), Some(&vec![String::from("NA009")]));

        Ok(())
    }

    #[test]
    fn concurrent_lookups() -> Result<(), anyhow::Error> {
        let store = store_with_source("f1", &["NA001", "NA002"])?;
        let registry = Arc::new(SourceRegistry::new(store, "files"));

        let handles = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.sample_names(&[String::from("f1")]))
            })
            .collect::<Vec<_>>();
        for handle in handles {
            let names = handle
                .join()
                .map_err(|_| anyhow::anyhow!("thread panicked"))??;
            assert_eq!(names.get("f1").map(|n| n.len()), Some(2));
        }

        Ok(())
    }
}
