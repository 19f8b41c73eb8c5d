//! Studies, derived from the source summaries in the files collection.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use super::Error;
use crate::{
    codec::{get_string, source as fields},
    model::{QueryResult, StudySummary},
    storage::{Document, DocumentStore, Filter, FindOptions, Projection},
};

pub struct StudyDbAdaptor {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl std::fmt::Debug for StudyDbAdaptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudyDbAdaptor")
            .field("collection", &self.collection)
            .finish()
    }
}

impl StudyDbAdaptor {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str) -> Self {
        Self {
            store,
            collection: collection.to_string(),
        }
    }

    /// Study id and name of the summaries matching `filter`, at most `limit` of them.
    fn find_studies(&self, filter: &Filter, limit: Option<usize>) -> Result<Vec<Document>, Error> {
        let options = FindOptions {
            projection: Some(
                Projection::default()
                    .include(fields::STUDY_ID_FIELD)
                    .include(fields::STUDY_NAME_FIELD),
            ),
            limit,
            ..Default::default()
        };
        Ok(self
            .store
            .find(&self.collection, filter, &options)?
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// One entry per distinct study id and name, with the number of its files.
    fn summarize(documents: &[Document]) -> Vec<StudySummary> {
        let mut studies: BTreeMap<(String, String), u64> = BTreeMap::new();
        for document in documents {
            let key = (
                get_string(document, fields::STUDY_ID_FIELD),
                get_string(document, fields::STUDY_NAME_FIELD),
            );
            *studies.entry(key).or_default() += 1;
        }
        studies
            .into_iter()
            .map(|((study_id, study_name), num_files)| StudySummary {
                study_id,
                study_name,
                num_files,
            })
            .collect()
    }

    /// All studies with at least one loaded file, ordered by id.
    pub fn list_studies(&self) -> Result<QueryResult<StudySummary>, Error> {
        let before = Instant::now();
        let documents = self.find_studies(&Filter::All, None)?;
        Ok(QueryResult::new("", before.elapsed(), Self::summarize(&documents)))
    }

    /// Id of the study that has `study` as its name or id.
    pub fn find_study_name_or_study_id(&self, study: &str) -> Result<QueryResult<String>, Error> {
        let before = Instant::now();
        let filter = Filter::or(vec![
            Filter::eq(fields::STUDY_NAME_FIELD, study),
            Filter::eq(fields::STUDY_ID_FIELD, study),
        ]);
        let study_ids = self
            .find_studies(&filter, Some(1))?
            .iter()
            .map(|document| get_string(document, fields::STUDY_ID_FIELD))
            .collect();
        Ok(QueryResult::new(study, before.elapsed(), study_ids))
    }

    /// The study with `study_id`; empty with a warning if no file belongs to it.
    pub fn get_study_by_id(&self, study_id: &str) -> Result<QueryResult<StudySummary>, Error> {
        let before = Instant::now();
        let documents = self.find_studies(&Filter::eq(fields::STUDY_ID_FIELD, study_id), None)?;
        let mut result = QueryResult::new(study_id, before.elapsed(), Self::summarize(&documents));
        if result.result.is_empty() {
            result.add_warning(&format!("Study {} not found", study_id));
        }
        Ok(result)
    }
}
