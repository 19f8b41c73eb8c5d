//! RocksDB-backed store.
//!
//! Each collection lives in its own column family, keyed by `_id` with the JSON document
//! as value.  Updates are read-modify-write cycles inside a pessimistic transaction that
//! locks the key via `get_for_update_cf`, so concurrent writers on the same record are
//! serialized by RocksDB and failed commits are retried.  Filters are evaluated while
//! scanning; `_id` equality is served by a point lookup.

use std::{
    path::Path,
    sync::{Arc, Mutex},
    thread::JoinHandle,
};

use super::{
    document_id, filter::resolve_in_map, finish_cursor, update::seed_document, Cursor, Document,
    DocumentStore, Error, Filter, FindOptions, IndexSpec, IndexState, UpdateOp, WriteResult,
};
use crate::common;

/// Name of the column family with metadata.
pub const CF_META: &str = "meta";

/// Number of commit attempts before giving up on a record.
const MAX_RETRIES: usize = 10;

type Db = rocksdb::TransactionDB<rocksdb::MultiThreaded>;

/// Store persisting collections into RocksDB column families.
pub struct RocksStore {
    db: Arc<Db>,
    collections: Vec<String>,
    index_builds: Mutex<Vec<JoinHandle<Result<(), Error>>>>,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .field("collections", &self.collections)
            .finish()
    }
}

impl RocksStore {
    /// Open or create the database at `path` with the given collections.
    pub fn open<P: AsRef<Path>>(
        path: P,
        collections: &[&str],
        path_wal_dir: Option<&str>,
    ) -> Result<Self, Error> {
        let mut options = rocksdb_utils_lookup::tune_options(rocksdb::Options::default(), path_wal_dir);
        options.create_if_missing(true);
        options.create_missing_column_families(true);
        let tx_options = rocksdb::TransactionDBOptions::default();
        let cf_descriptors = Self::cf_names(collections)
            .iter()
            .map(|name| rocksdb::ColumnFamilyDescriptor::new(name, options.clone()))
            .collect::<Vec<_>>();

        let db = Db::open_cf_descriptors(&options, &tx_options, path.as_ref(), cf_descriptors)?;
        let cf_meta = db
            .cf_handle(CF_META)
            .ok_or_else(|| Error::UnknownCollection(CF_META.to_string()))?;
        db.put_cf(&cf_meta, "variant-store-version", common::worker_version())?;
        db.put_cf(&cf_meta, "db-name", "variant-store")?;
        drop(cf_meta);

        Ok(Self {
            db: Arc::new(db),
            collections: collections.iter().map(|s| s.to_string()).collect(),
            index_builds: Mutex::new(Vec::new()),
        })
    }

    /// All column family names for the given collections.
    pub fn cf_names(collections: &[&str]) -> Vec<String> {
        std::iter::once(CF_META)
            .chain(collections.iter().copied())
            .map(|s| s.to_string())
            .collect()
    }

    /// Block until all background index builds are done.
    pub fn wait_for_index_builds(&self) -> Result<(), Error> {
        let handles = std::mem::take(
            &mut *self
                .index_builds
                .lock()
                .map_err(|e| Error::Poisoned(e.to_string()))?,
        );
        for handle in handles {
            handle
                .join()
                .map_err(|_| Error::Poisoned(String::from("index build thread panicked")))??;
        }
        Ok(())
    }

    /// Compact all column families of the database at `path`.
    ///
    /// Must be called after all `RocksStore` handles on `path` are dropped.
    pub fn compact<P: AsRef<Path>>(path: P, collections: &[&str]) -> Result<(), anyhow::Error> {
        let options = rocksdb::Options::default();
        let cf_names = Self::cf_names(collections);
        let db = Arc::new(rocksdb::DB::open_cf_with_opts(
            &options,
            path.as_ref(),
            cf_names
                .iter()
                .map(|name| (name.to_string(), options.clone()))
                .collect::<Vec<_>>(),
        )?);
        let cf_names = cf_names.iter().map(|s| s.as_str()).collect::<Vec<_>>();
        rocksdb_utils_lookup::force_compaction_cf(&db, &cf_names, Some("  "), true)?;
        Ok(())
    }

    fn cf(&self, collection: &str) -> Result<Arc<rocksdb::BoundColumnFamily<'_>>, Error> {
        self.db
            .cf_handle(collection)
            .ok_or_else(|| Error::UnknownCollection(collection.to_string()))
    }

    fn index_key(collection: &str, name: &str) -> String {
        format!("index:{}:{}", collection, name)
    }

    /// Read-modify-write of the record with `id`, retried on conflicts.
    fn update_by_id(&self, collection: &str, id: &str, op: &UpdateOp) -> Result<WriteResult, Error> {
        let mut retries = 0;
        loop {
            match self.try_update_by_id(collection, id, op) {
                Ok(result) => return Ok(result),
                Err(Error::Rocks(e)) => {
                    retries += 1;
                    if retries > 5 {
                        tracing::warn!(
                            "problem committing transaction for {:?} in {}: {} (retry #{})",
                            id,
                            collection,
                            e,
                            retries
                        );
                    }
                    if retries >= MAX_RETRIES {
                        return Err(Error::RetriesExceeded(id.to_string(), retries));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn try_update_by_id(
        &self,
        collection: &str,
        id: &str,
        op: &UpdateOp,
    ) -> Result<WriteResult, Error> {
        let cf = self.cf(collection)?;
        let transaction = self.db.transaction();
        let existing = transaction
            .get_for_update_cf(&cf, id.as_bytes(), true)?
            .map(|buffer| serde_json::from_slice::<Document>(&buffer))
            .transpose()?;

        let mut result = WriteResult::default();
        let document = match existing {
            Some(mut document) if op.filter.matches_document(&document) => {
                let before = document.clone();
                op.update.apply(&mut document, false)?;
                result.matched = 1;
                if document != before {
                    result.modified = 1;
                    Some(document)
                } else {
                    None
                }
            }
            None if op.upsert => {
                let mut document = seed_document(&op.filter);
                op.update.apply(&mut document, true)?;
                document.insert(String::from("_id"), id.into());
                result.upserted = 1;
                Some(document)
            }
            _ => None,
        };

        if let Some(document) = document {
            transaction.put_cf(&cf, id.as_bytes(), serde_json::to_vec(&document)?)?;
        }
        transaction.commit()?;
        Ok(result)
    }

    fn try_insert_if_absent(
        &self,
        collection: &str,
        id: &str,
        document: &Document,
    ) -> Result<bool, Error> {
        let cf = self.cf(collection)?;
        let transaction = self.db.transaction();
        if transaction
            .get_for_update_cf(&cf, id.as_bytes(), true)?
            .is_some()
        {
            transaction.rollback()?;
            return Ok(false);
        }
        transaction.put_cf(&cf, id.as_bytes(), serde_json::to_vec(document)?)?;
        transaction.commit()?;
        Ok(true)
    }

    fn write_index_spec(db: &Db, collection: &str, spec: &IndexSpec) -> Result<(), Error> {
        let cf_meta = db
            .cf_handle(CF_META)
            .ok_or_else(|| Error::UnknownCollection(CF_META.to_string()))?;
        db.put_cf(
            &cf_meta,
            Self::index_key(collection, &spec.name),
            serde_json::to_vec(spec)?,
        )?;
        Ok(())
    }
}

/// Scan `collection` and record the number of documents covered by `spec`.
fn build_index(db: &Db, collection: &str, mut spec: IndexSpec) -> Result<(), Error> {
    let before = std::time::Instant::now();
    tracing::debug!("building index {} on {}", &spec.name, collection);
    let cf = db
        .cf_handle(collection)
        .ok_or_else(|| Error::UnknownCollection(collection.to_string()))?;
    let mut entries = 0;
    for item in db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
        let (_, value) = item?;
        let document = serde_json::from_slice::<Document>(&value)?;
        if spec
            .keys
            .iter()
            .any(|(key, _)| !resolve_in_map(&document, key).is_empty())
        {
            entries += 1;
        }
    }
    spec.state = IndexState::Ready;
    spec.entries = entries;
    RocksStore::write_index_spec(db, collection, &spec)?;
    tracing::debug!(
        "... done building index {} on {} in {:?}",
        &spec.name,
        collection,
        before.elapsed()
    );
    Ok(())
}

impl DocumentStore for RocksStore {
    fn ensure_collection(&self, collection: &str) -> Result<(), Error> {
        self.cf(collection).map(|_| ())
    }

    fn find<'a>(
        &'a self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Cursor<'a>, Error> {
        // reading a collection without column family finds nothing, like an empty one
        let Some(cf) = self.db.cf_handle(collection) else {
            return Ok(Box::new(std::iter::empty()));
        };
        if let Some(id) = filter.id() {
            let document = self
                .db
                .get_cf(&cf, id.as_bytes())?
                .map(|buffer| serde_json::from_slice::<Document>(&buffer))
                .transpose()?;
            return finish_cursor(document.into_iter().map(Ok), filter, options);
        }

        let documents = self
            .db
            .iterator_cf(&cf, rocksdb::IteratorMode::Start)
            .map(|item| -> Result<Document, Error> {
                let (_, value) = item?;
                Ok(serde_json::from_slice::<Document>(&value)?)
            });
        finish_cursor(documents, filter, options)
    }

    fn update(&self, collection: &str, op: &UpdateOp) -> Result<WriteResult, Error> {
        if let Some(id) = op.filter.id() {
            return self.update_by_id(collection, id, op);
        }

        // Collect candidate keys first, the filter is checked again under the lock.
        let mut ids = Vec::new();
        for document in self.find(collection, &op.filter, &FindOptions::default())? {
            ids.push(document_id(&document?)?.to_string());
            if !op.multi {
                break;
            }
        }

        let mut result = WriteResult::default();
        if ids.is_empty() {
            if op.upsert {
                let id = uuid::Uuid::new_v4().to_string();
                result += self.update_by_id(collection, &id, op)?;
            }
        } else {
            let op = UpdateOp {
                upsert: false,
                ..op.clone()
            };
            for id in ids {
                result += self.update_by_id(collection, &id, &op)?;
            }
        }
        Ok(result)
    }

    fn insert_if_absent(&self, collection: &str, document: Document) -> Result<bool, Error> {
        let id = document_id(&document)?.to_string();
        let mut retries = 0;
        loop {
            match self.try_insert_if_absent(collection, &id, &document) {
                Ok(inserted) => return Ok(inserted),
                Err(Error::Rocks(e)) => {
                    retries += 1;
                    tracing::debug!("retrying insert of {:?}: {}", &id, e);
                    if retries >= MAX_RETRIES {
                        return Err(Error::RetriesExceeded(id, retries));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<(), Error> {
        self.ensure_collection(collection)?;
        let spec = IndexSpec {
            state: IndexState::Building,
            ..spec.clone()
        };
        Self::write_index_spec(&self.db, collection, &spec)?;

        if spec.background {
            let db = self.db.clone();
            let collection = collection.to_string();
            let handle = std::thread::spawn(move || build_index(&db, &collection, spec));
            self.index_builds
                .lock()
                .map_err(|e| Error::Poisoned(e.to_string()))?
                .push(handle);
            Ok(())
        } else {
            build_index(&self.db, collection, spec)
        }
    }

    fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, Error> {
        let cf_meta = self.cf(CF_META)?;
        let prefix = format!("index:{}:", collection);
        let mut result = Vec::new();
        let iter = self.db.iterator_cf(
            &cf_meta,
            rocksdb::IteratorMode::From(prefix.as_bytes(), rocksdb::Direction::Forward),
        );
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            result.push(serde_json::from_slice::<IndexSpec>(&value)?);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use temp_testdir::TempDir;

    use super::*;
    use crate::storage::Update;

    fn as_document(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn upsert_and_find() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let store = RocksStore::open(tmp_dir.join("db"), &["variants"], None)?;

        let op = |fid: &str| {
            UpdateOp::upsert_one(
                Filter::and(vec![Filter::eq("_id", "1_1000_A_C"), Filter::eq("chr", "1")]),
                Update::default()
                    .set_on_insert(as_document(json!({"start": 1000})))
                    .add_to_set("files", vec![json!({"fid": fid})]),
            )
        };
        assert_eq!(store.update("variants", &op("f1"))?.upserted, 1);
        assert_eq!(store.update("variants", &op("f2"))?.matched, 1);

        let documents = store
            .find("variants", &Filter::eq("chr", "1"), &FindOptions::default())?
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(
            documents,
            vec![as_document(json!({
                "_id": "1_1000_A_C",
                "chr": "1",
                "start": 1000,
                "files": [{"fid": "f1"}, {"fid": "f2"}]
            }))]
        );

        Ok(())
    }

    #[test]
    fn concurrent_upserts_are_merged() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let store = Arc::new(RocksStore::open(tmp_dir.join("db"), &["variants"], None)?);

        let handles = (0..4)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || -> Result<(), Error> {
                    for j in 0..10 {
                        store.update(
                            "variants",
                            &UpdateOp::upsert_one(
                                Filter::eq("_id", "v1"),
                                Update::default().add_to_set("files", vec![json!([i, j])]),
                            ),
                        )?;
                    }
                    Ok(())
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().map_err(|_| anyhow::anyhow!("thread panicked"))??;
        }

        let document = store
            .find("variants", &Filter::eq("_id", "v1"), &FindOptions::default())?
            .next()
            .transpose()?
            .unwrap_or_default();
        assert_eq!(document["files"].as_array().map(|a| a.len()), Some(40));

        Ok(())
    }

    #[test]
    fn multi_update_without_id() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let store = RocksStore::open(tmp_dir.join("db"), &["files"], None)?;
        for (id, sid) in [("a", "s1"), ("b", "s1"), ("c", "s2")] {
            store.insert_if_absent("files", as_document(json!({"_id": id, "sid": sid})))?;
        }

        let result = store.update(
            "files",
            &UpdateOp::update_many(
                Filter::eq("sid", "s1"),
                Update::default().set("st", json!({"nVar": 3})),
            ),
        )?;

        assert_eq!(result.matched, 2);
        assert_eq!(store.count("files", &Filter::Exists("st".into(), true))?, 2);

        Ok(())
    }

    #[test]
    fn background_index_becomes_ready() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let store = RocksStore::open(tmp_dir.join("db"), &["variants"], None)?;
        store.insert_if_absent("variants", as_document(json!({"_id": "v1", "chr": "1"})))?;
        store.insert_if_absent("variants", as_document(json!({"_id": "v2"})))?;

        store.create_index("variants", &IndexSpec::new(&[("chr", 1)], true))?;
        store.wait_for_index_builds()?;

        let indexes = store.list_indexes("variants")?;
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].state, IndexState::Ready);
        assert_eq!(indexes[0].entries, 1);

        Ok(())
    }

    #[test]
    fn unknown_collection() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let store = RocksStore::open(tmp_dir.join("db"), &["variants"], None)?;

        assert!(matches!(
            store.ensure_collection("nope"),
            Err(Error::UnknownCollection(_))
        ));
        assert!(matches!(
            store.update(
                "nope",
                &UpdateOp::upsert_one(Filter::eq("_id", "v1"), Update::default().set("x", json!(1)))
            ),
            Err(Error::UnknownCollection(_))
        ));

        Ok(())
    }

    #[test]
    fn find_in_unknown_collection_is_empty() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let store = RocksStore::open(tmp_dir.join("db"), &["variants"], None)?;

        assert_eq!(
            store
                .find("nope", &Filter::All, &FindOptions::default())?
                .count(),
            0
        );
        assert_eq!(
            store
                .find("nope", &Filter::eq("_id", "v1"), &FindOptions::default())?
                .count(),
            0
        );
        assert_eq!(store.count("nope", &Filter::All)?, 0);

        Ok(())
    }
}
