//! In-process store, used for tests and small jobs.

use std::{
    collections::BTreeMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use super::{
    document_id, finish_cursor, update::seed_document, Cursor, Document, DocumentStore, Error,
    Filter, FindOptions, IndexSpec, IndexState, UpdateOp, WriteResult,
};

type Collections = BTreeMap<String, BTreeMap<String, Document>>;

/// Store keeping all collections in memory behind one lock.
///
/// Every update holds the write lock for its whole read-modify-write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    indexes: RwLock<BTreeMap<String, Vec<IndexSpec>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>, Error> {
        self.collections
            .read()
            .map_err(|e| Error::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>, Error> {
        self.collections
            .write()
            .map_err(|e| Error::Poisoned(e.to_string()))
    }
}

impl DocumentStore for MemoryStore {
    fn ensure_collection(&self, collection: &str) -> Result<(), Error> {
        self.write()?.entry(collection.to_string()).or_default();
        Ok(())
    }

    fn find<'a>(
        &'a self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Cursor<'a>, Error> {
        // Snapshot the candidates so that no lock is held while the caller iterates.
        let documents = {
            let collections = self.read()?;
            match (collections.get(collection), filter.id()) {
                (None, _) => Vec::new(),
                (Some(documents), Some(id)) => documents.get(id).cloned().into_iter().collect(),
                (Some(documents), None) => documents.values().cloned().collect(),
            }
        };
        finish_cursor(documents.into_iter().map(Ok), filter, options)
    }

    fn update(&self, collection: &str, op: &UpdateOp) -> Result<WriteResult, Error> {
        let mut collections = self.write()?;
        let documents = collections.entry(collection.to_string()).or_default();

        let matching_ids = match op.filter.id() {
            Some(id) => documents
                .get(id)
                .filter(|document| op.filter.matches_document(document))
                .map(|_| vec![id.to_string()])
                .unwrap_or_default(),
            None => documents
                .iter()
                .filter(|(_, document)| op.filter.matches_document(document))
                .map(|(id, _)| id.clone())
                .take(if op.multi { usize::MAX } else { 1 })
                .collect(),
        };

        let mut result = WriteResult::default();
        if !matching_ids.is_empty() {
            // Apply to copies so that a failing update leaves every match untouched.
            let mut updated = Vec::with_capacity(matching_ids.len());
            for id in matching_ids {
                if let Some(document) = documents.get(&id) {
                    let mut copy = document.clone();
                    op.update.apply(&mut copy, false)?;
                    result.matched += 1;
                    if copy != *document {
                        result.modified += 1;
                        updated.push((id, copy));
                    }
                }
            }
            documents.extend(updated);
        } else if op.upsert {
            let mut document = seed_document(&op.filter);
            op.update.apply(&mut document, true)?;
            if !document.contains_key("_id") {
                document.insert(
                    String::from("_id"),
                    uuid::Uuid::new_v4().to_string().into(),
                );
            }
            let id = document_id(&document)?.to_string();
            documents.insert(id, document);
            result.upserted += 1;
        }
        Ok(result)
    }

    fn insert_if_absent(&self, collection: &str, document: Document) -> Result<bool, Error> {
        let id = document_id(&document)?.to_string();
        let mut collections = self.write()?;
        let documents = collections.entry(collection.to_string()).or_default();
        if documents.contains_key(&id) {
            Ok(false)
        } else {
            documents.insert(id, document);
            Ok(true)
        }
    }

    fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<(), Error> {
        let entries = {
            let collections = self.read()?;
            collections
                .get(collection)
                .map(|documents| {
                    documents
                        .values()
                        .filter(|document| {
                            spec.keys.iter().any(|(key, _)| {
                                !super::filter::resolve_in_map(document, key).is_empty()
                            })
                        })
                        .count() as u64
                })
                .unwrap_or_default()
        };
        let mut indexes = self
            .indexes
            .write()
            .map_err(|e| Error::Poisoned(e.to_string()))?;
        let specs = indexes.entry(collection.to_string()).or_default();
        specs.retain(|other| other.name != spec.name);
        specs.push(IndexSpec {
            state: IndexState::Ready,
            entries,
            ..spec.clone()
        });
        Ok(())
    }

    fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, Error> {
        Ok(self
            .indexes
            .read()
            .map_err(|e| Error::Poisoned(e.to_string()))?
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::storage::Update;

    #[test]
    fn upsert_inserts_then_merges() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        let filter = Filter::and(vec![Filter::eq("_id", "v1"), Filter::eq("chr", "1")]);
        let op = |id: &str| {
            UpdateOp::upsert_one(
                filter.clone(),
                Update::default()
                    .set_on_insert(json!({"start": 5}).as_object().cloned().unwrap_or_default())
                    .add_to_set("files", vec![json!({"fid": id})]),
            )
        };

        let first = store.update("variants", &op("f1"))?;
        let second = store.update("variants", &op("f2"))?;

        assert_eq!(first.upserted, 1);
        assert_eq!(second.matched, 1);
        let documents = store
            .find("variants", &Filter::All, &FindOptions::default())?
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(
            documents,
            vec![json!({"_id": "v1", "chr": "1", "start": 5, "files": [{"fid": "f1"}, {"fid": "f2"}]})
                .as_object()
                .cloned()
                .unwrap_or_default()]
        );

        Ok(())
    }

    #[test]
    fn update_without_upsert_on_missing_is_noop() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        let result = store.update(
            "variants",
            &UpdateOp::update_one(
                Filter::eq("_id", "missing"),
                Update::default().set("annot", json!({})),
            ),
        )?;

        assert_eq!(result, WriteResult::default());
        assert_eq!(store.count("variants", &Filter::All)?, 0);

        Ok(())
    }

    #[test]
    fn failed_update_leaves_document_unchanged() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        let original = json!({"_id": "v1", "files": [{"fid": "f1"}], "st": 5})
            .as_object()
            .cloned()
            .unwrap_or_default();
        store.insert_if_absent("variants", original.clone())?;

        let result = store.update(
            "variants",
            &UpdateOp::update_one(
                Filter::eq("_id", "v1"),
                Update::default()
                    .set("annot", json!({"id": "rs1"}))
                    .add_to_set("files", vec![json!({"fid": "f2"})])
                    .push("st", vec![json!({"cid": "ALL"})]),
            ),
        );

        assert!(matches!(result, Err(Error::NotAnArray { .. })));
        let stored = store
            .find("variants", &Filter::eq("_id", "v1"), &FindOptions::default())?
            .next()
            .transpose()?;
        assert_eq!(stored, Some(original));

        Ok(())
    }

    #[test]
    fn insert_if_absent_once() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        let document = json!({"_id": "s1_f1", "fname": "a.vcf"})
            .as_object()
            .cloned()
            .unwrap_or_default();

        assert!(store.insert_if_absent("files", document.clone())?);
        assert!(!store.insert_if_absent("files", document)?);

        Ok(())
    }

    #[test]
    fn concurrent_upserts_keep_all_contributions() -> Result<(), anyhow::Error> {
        let store = Arc::new(MemoryStore::new());
        let handles = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.update(
                        "variants",
                        &UpdateOp::upsert_one(
                            Filter::eq("_id", "v1"),
                            Update::default().add_to_set("files", vec![json!({"fid": i})]),
                        ),
                    )
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
        assert_eq!(document["files"].as_array().map(|a| a.len()), Some(8));

        Ok(())
    }

    #[test]
    fn create_index_is_listed_ready() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        store.create_index("variants", &IndexSpec::new(&[("chr", 1)], true))?;

        let indexes = store.list_indexes("variants")?;
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].state, IndexState::Ready);

        Ok(())
    }
}
