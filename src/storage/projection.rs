//! Field projection of returned documents.

use indexmap::IndexMap;
use serde_json::Value;

use super::{Document, Filter};

/// How one top-level field is projected.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldProjection {
    /// Keep the field as is.
    Include,
    /// Keep only the first array element matching the filter.
    ElemMatch(Filter),
}

/// Selection of top-level fields; `_id` is always kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub fields: IndexMap<String, FieldProjection>,
}

impl Projection {
    pub fn include(mut self, field: &str) -> Self {
        self.fields
            .insert(field.to_string(), FieldProjection::Include);
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn apply(&self, mut document: Document) -> Document {
        let mut result = Document::new();
        if let Some(id) = document.remove("_id") {
            result.insert(String::from("_id"), id);
        }
        for (field, projection) in &self.fields {
            match (projection, document.remove(field)) {
                (FieldProjection::Include, Some(value)) => {
                    result.insert(field.clone(), value);
                }
                (FieldProjection::ElemMatch(filter), Some(Value::Array(items))) => {
                    let selected = items
                        .into_iter()
                        .find(|item| filter.matches(item))
                        .map(|item| vec![item])
                        .unwrap_or_default();
                    result.insert(field.clone(), Value::Array(selected));
                }
                _ => (),
            }
        }
        result
    }
}
