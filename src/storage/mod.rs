//! Document-oriented backing store.
//!
//! Records are JSON documents (`serde_json::Map`) grouped into named collections and
//! keyed by their string `_id`.  The `DocumentStore` trait is the seam between the
//! variant engine and a concrete backend; `MemoryStore` keeps everything in process and
//! `RocksStore` persists into RocksDB column families.

use std::cmp::Ordering;

use serde_json::Value;

pub mod filter;
pub mod memory;
pub mod projection;
pub mod rocks;
pub mod update;

pub use filter::{Filter, Pattern};
pub use memory::MemoryStore;
pub use projection::{FieldProjection, Projection};
pub use rocks::RocksStore;
pub use update::Update;

/// A stored document.
pub type Document = serde_json::Map<String, Value>;

/// Lazy sequence of documents returned by `DocumentStore::find`.
pub type Cursor<'a> = Box<dyn Iterator<Item = Result<Document, Error>> + 'a>;

/// Error type for the storage layer.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    #[error("problem accessing RocksDB: {0}")]
    Rocks(#[from] rocksdb::Error),
    #[error("problem (de)serializing document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("document has no string _id")]
    MissingId,
    #[error("cannot {op} on non-array field {field}")]
    NotAnArray { op: &'static str, field: String },
    #[error("cannot descend into non-object field {field}")]
    NotAnObject { field: String },
    #[error("transaction on {0} did not commit after {1} retries")]
    RetriesExceeded(String, usize),
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

/// One update, possibly inserting (`upsert`) or touching all matches (`multi`).
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOp {
    pub filter: Filter,
    pub update: Update,
    pub upsert: bool,
    pub multi: bool,
}

impl UpdateOp {
    /// Update the first match, inserting if there is none.
    pub fn upsert_one(filter: Filter, update: Update) -> Self {
        Self {
            filter,
            update,
            upsert: true,
            multi: false,
        }
    }

    /// Update the first match only.
    pub fn update_one(filter: Filter, update: Update) -> Self {
        Self {
            filter,
            update,
            upsert: false,
            multi: false,
        }
    }

    /// Update all matches.
    pub fn update_many(filter: Filter, update: Update) -> Self {
        Self {
            filter,
            update,
            upsert: false,
            multi: true,
        }
    }
}

/// Counters of a write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteResult {
    pub matched: u64,
    pub modified: u64,
    pub upserted: u64,
}

impl std::ops::AddAssign for WriteResult {
    fn add_assign(&mut self, other: Self) {
        self.matched += other.matched;
        self.modified += other.modified;
        self.upserted += other.upserted;
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Options of `DocumentStore::find`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Vec<(String, SortOrder)>,
    pub skip: usize,
    pub limit: Option<usize>,
}

/// Build state of an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    #[default]
    Building,
    Ready,
}

/// Requested index over one or more fields.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IndexSpec {
    /// Name derived from the keys, e.g., `chr_1_start_1`.
    pub name: String,
    /// Field paths with direction (1 or -1).
    pub keys: Vec<(String, i32)>,
    /// Whether the build runs in the background.
    pub background: bool,
    #[serde(default)]
    pub state: IndexState,
    /// Number of documents having any of the keys, set when ready.
    #[serde(default)]
    pub entries: u64,
}

impl IndexSpec {
    pub fn new(keys: &[(&str, i32)], background: bool) -> Self {
        Self {
            name: keys
                .iter()
                .map(|(key, dir)| format!("{}_{}", key, dir))
                .collect::<Vec<_>>()
                .join("_"),
            keys: keys.iter().map(|(k, d)| (k.to_string(), *d)).collect(),
            background,
            state: IndexState::Building,
            entries: 0,
        }
    }
}

/// Backend of collections of documents.
///
/// Single-document updates are atomic: a concurrent `update` on the same `_id` never
/// loses either modification.  Nothing spans more than one document.
pub trait DocumentStore: Send + Sync {
    /// Fail unless `collection` can be used.
    fn ensure_collection(&self, collection: &str) -> Result<(), Error>;

    /// Lazily iterate the documents matching `filter`.
    fn find<'a>(
        &'a self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Cursor<'a>, Error>;

    /// Count documents matching `filter`.
    fn count(&self, collection: &str, filter: &Filter) -> Result<u64, Error> {
        let mut count = 0;
        for document in self.find(collection, filter, &FindOptions::default())? {
            document?;
            count += 1;
        }
        Ok(count)
    }

    /// Atomically apply one update.
    fn update(&self, collection: &str, op: &UpdateOp) -> Result<WriteResult, Error>;

    /// Apply updates in order, stopping at the first failure.
    ///
    /// Updates applied before a failure stay applied.
    fn bulk_write(&self, collection: &str, ops: &[UpdateOp]) -> Result<WriteResult, Error> {
        let mut result = WriteResult::default();
        for op in ops {
            result += self.update(collection, op)?;
        }
        Ok(result)
    }

    /// Insert `document` unless one with the same `_id` exists; returns whether inserted.
    fn insert_if_absent(&self, collection: &str, document: Document) -> Result<bool, Error>;

    /// Request an index; background requests return before the build finishes.
    fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<(), Error>;

    /// Indexes requested on `collection`.
    fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, Error>;
}

/// String `_id` of a document.
pub fn document_id(document: &Document) -> Result<&str, Error> {
    document
        .get("_id")
        .and_then(|id| id.as_str())
        .ok_or(Error::MissingId)
}

/// Apply filter, sort, skip, limit and projection to a raw document sequence.
///
/// Sorting has to materialize the matches; everything else stays lazy.
pub(crate) fn finish_cursor<'a, I>(
    documents: I,
    filter: &Filter,
    options: &FindOptions,
) -> Result<Cursor<'a>, Error>
where
    I: Iterator<Item = Result<Document, Error>> + 'a,
{
    let filter = filter.clone();
    let matching = documents.filter(move |document| match document {
        Ok(document) => filter.matches_document(document),
        Err(_) => true,
    });

    let sorted: Cursor<'a> = if options.sort.is_empty() {
        Box::new(matching)
    } else {
        let mut documents = matching.collect::<Result<Vec<_>, _>>()?;
        let sort = options.sort.clone();
        documents.sort_by(|lhs, rhs| compare_documents(lhs, rhs, &sort));
        Box::new(documents.into_iter().map(Ok))
    };

    let limited = sorted
        .skip(options.skip)
        .take(options.limit.unwrap_or(usize::MAX));
    match options.projection.clone() {
        Some(projection) => Ok(Box::new(
            limited.map(move |document| document.map(|document| projection.apply(document))),
        )),
        None => Ok(Box::new(limited)),
    }
}

fn compare_documents(lhs: &Document, rhs: &Document, sort: &[(String, SortOrder)]) -> Ordering {
    for (path, order) in sort {
        let lhs_value = filter::resolve_in_map(lhs, path).into_iter().next();
        let rhs_value = filter::resolve_in_map(rhs, path).into_iter().next();
        let ordering = compare_values(lhs_value, rhs_value);
        let ordering = match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Order missing < numbers < strings < everything else.
fn compare_values(lhs: Option<&Value>, rhs: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(_) => 3,
        }
    }
    match (lhs, rhs) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        _ => rank(lhs).cmp(&rank(rhs)),
    }
}
