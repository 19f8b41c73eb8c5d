//! Command line sub commands.

pub mod annotate;
pub mod load;
pub mod query;
pub mod sources;

use std::{io::Write, sync::Arc};

use crate::{
    common::io::open_write_maybe_gz,
    storage::{DocumentStore, RocksStore},
    FILES_COLLECTION, VARIANTS_COLLECTION,
};

/// Collections of a variant store database.
pub const COLLECTIONS: &[&str] = &[VARIANTS_COLLECTION, FILES_COLLECTION];

/// Open the RocksDB-backed store at `path_db`.
pub fn open_store(
    path_db: &str,
    path_wal_dir: Option<&str>,
) -> Result<Arc<RocksStore>, anyhow::Error> {
    tracing::info!("Opening RocksDB at {} ...", path_db);
    let before_open = std::time::Instant::now();
    let store = RocksStore::open(path_db, COLLECTIONS, path_wal_dir)
        .map_err(|e| anyhow::anyhow!("problem opening store at {}: {}", path_db, e))?;
    for collection in COLLECTIONS {
        store.ensure_collection(collection)?;
    }
    tracing::info!("... done opening RocksDB in {:?}", before_open.elapsed());
    Ok(Arc::new(store))
}

/// Writer for `path`, stdout for `-`.
pub fn open_output(path: &str) -> Result<Box<dyn Write>, anyhow::Error> {
    if path == "-" {
        Ok(Box::new(std::io::BufWriter::new(std::io::stdout())))
    } else {
        open_write_maybe_gz(path)
            .map_err(|e| anyhow::anyhow!("could not open {} for writing: {}", path, e))
    }
}

/// Write `value` as one JSON line.
pub fn write_json_line<T: serde::Serialize>(
    writer: &mut dyn Write,
    value: &T,
) -> Result<(), anyhow::Error> {
    serde_json::to_writer(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    Ok(())
}
