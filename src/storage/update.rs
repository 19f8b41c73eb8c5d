//! Update operators applied to stored documents.

use serde_json::Value;

use super::{Document, Error, Filter};

/// An atomic modification of one document.
///
/// The operators are applied in this order: `set_on_insert` (only when the document is
/// created by this update), `pull`, `set`, `add_to_set`, `push`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    /// Fields written only when the update inserts the document.
    pub set_on_insert: Option<Document>,
    /// Unconditional assignments.
    pub set: Vec<(String, Value)>,
    /// Values appended to arrays unless an equal value is present.
    pub add_to_set: Vec<(String, Vec<Value>)>,
    /// Values appended to arrays.
    pub push: Vec<(String, Vec<Value>)>,
    /// Array elements removed if they match any of the filters.
    pub pull: Vec<(String, Vec<Filter>)>,
}

impl Update {
    pub fn set_on_insert(mut self, document: Document) -> Self {
        self.set_on_insert = Some(document);
        self
    }

    pub fn set(mut self, path: &str, value: Value) -> Self {
        self.set.push((path.to_string(), value));
        self
    }

    pub fn add_to_set(mut self, path: &str, values: Vec<Value>) -> Self {
        self.add_to_set.push((path.to_string(), values));
        self
    }

    pub fn push(mut self, path: &str, values: Vec<Value>) -> Self {
        self.push.push((path.to_string(), values));
        self
    }

    pub fn pull_any(mut self, path: &str, filters: Vec<Filter>) -> Self {
        self.pull.push((path.to_string(), filters));
        self
    }

    /// Apply to `document`; `inserted` tells whether the document is new.
    pub fn apply(&self, document: &mut Document, inserted: bool) -> Result<(), Error> {
        if inserted {
            if let Some(on_insert) = &self.set_on_insert {
                for (key, value) in on_insert {
                    document.insert(key.clone(), value.clone());
                }
            }
        }
        for (path, filters) in &self.pull {
            if let Some(Value::Array(items)) = lookup_mut(document, path) {
                items.retain(|item| !filters.iter().any(|f| f.matches(item)));
            }
        }
        for (path, value) in &self.set {
            *field_mut(document, path)? = value.clone();
        }
        for (path, values) in &self.add_to_set {
            let items = array_mut(document, path, "addToSet")?;
            for value in values {
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
        }
        for (path, values) in &self.push {
            array_mut(document, path, "push")?.extend(values.iter().cloned());
        }
        Ok(())
    }
}

/// Seed document for an upsert that found nothing: the filter's top-level equalities.
pub fn seed_document(filter: &Filter) -> Document {
    filter
        .equalities()
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn lookup_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Value> {
    let mut segments = path.split('.');
    let mut current = document.get_mut(segments.next()?)?;
    for segment in segments {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}

/// The field at `path`, created as `null` along with missing parent objects.
fn field_mut<'a>(document: &'a mut Document, path: &str) -> Result<&'a mut Value, Error> {
    let (parents, last) = match path.rsplit_once('.') {
        Some((parents, last)) => (Some(parents), last),
        None => (None, path),
    };
    let mut current = document;
    if let Some(parents) = parents {
        for segment in parents.split('.') {
            let child = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            current = child.as_object_mut().ok_or_else(|| Error::NotAnObject {
                field: path.to_string(),
            })?;
        }
    }
    Ok(current.entry(last.to_string()).or_insert(Value::Null))
}

fn array_mut<'a>(
    document: &'a mut Document,
    path: &str,
    op: &'static str,
) -> Result<&'a mut Vec<Value>, Error> {
    let field = field_mut(document, path)?;
    if field.is_null() {
        *field = Value::Array(Vec::new());
    }
    field.as_array_mut().ok_or_else(|| Error::NotAnArray {
        op,
        field: path.to_string(),
    })
}
