//! Lazy decoding of query results.

use std::time::{Duration, Instant};

use crate::{
    codec::VariantCodec,
    model::Variant,
    storage::{self, Cursor},
};

/// Error type for `ResultIterator`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("problem reading from store: {0}")]
    Storage(#[from] storage::Error),
    #[error("problem decoding variant: {0}")]
    Codec(#[from] crate::codec::Error),
}

/// Decodes one stored document per call to `next()`.
///
/// Dropping the iterator cancels the query.
pub struct ResultIterator<'a> {
    cursor: Cursor<'a>,
    codec: VariantCodec,
    time_fetching: Duration,
    time_converting: Duration,
}

impl<'a> ResultIterator<'a> {
    pub fn new(cursor: Cursor<'a>, codec: VariantCodec) -> Self {
        Self {
            cursor,
            codec,
            time_fetching: Duration::default(),
            time_converting: Duration::default(),
        }
    }

    /// Time spent waiting for the store.
    pub fn time_fetching(&self) -> Duration {
        self.time_fetching
    }

    /// Time spent decoding.
    pub fn time_converting(&self) -> Duration {
        self.time_converting
    }
}

impl Iterator for ResultIterator<'_> {
    type Item = Result<Variant, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let before = Instant::now();
        let document = self.cursor.next()?;
        self.time_fetching += before.elapsed();

        let before = Instant::now();
        let result = document
            .map_err(Error::from)
            .and_then(|document| self.codec.decode(&document).map_err(Error::from));
        self.time_converting += before.elapsed();
        Some(result)
    }
}
