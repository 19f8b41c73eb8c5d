//! Backend-neutral predicate tree over JSON documents.
//!
//! Paths are dotted field names.  When a path runs into an array, the remaining path is
//! applied to each element, so `annot.ct.so` reaches the `so` lists of all consequence
//! types.  A leaf predicate holds if any value reached by the path satisfies it, where
//! array values contribute both themselves and their elements.

use serde_json::Value;

use super::Document;

/// A compiled regular expression that compares by its source text.
#[derive(Debug, Clone)]
pub struct Pattern(regex::Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self(regex::Regex::new(pattern)?))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.0.is_match(value)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Predicate over documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches everything.
    All,
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
    Lt(String, f64),
    Lte(String, f64),
    Gt(String, f64),
    Gte(String, f64),
    Regex(String, Pattern),
    /// Presence (`true`) or absence (`false`) of the path.
    Exists(String, bool),
    /// At least one element of the array at the path matches all of the inner filter.
    ElemMatch(String, Box<Filter>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq<V: Into<Value>>(path: &str, value: V) -> Self {
        Filter::Eq(path.to_string(), value.into())
    }

    pub fn is_in<V: Into<Value>>(path: &str, values: Vec<V>) -> Self {
        Filter::In(
            path.to_string(),
            values.into_iter().map(|v| v.into()).collect(),
        )
    }

    /// Equality for a single value, membership for several.
    pub fn eq_or_in(path: &str, mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            Filter::eq(path, values.remove(0))
        } else {
            Filter::is_in(path, values)
        }
    }

    pub fn elem_match(path: &str, filter: Filter) -> Self {
        Filter::ElemMatch(path.to_string(), Box::new(filter))
    }

    /// Conjunction; a single filter is returned unwrapped and none gives `All`.
    pub fn and(mut filters: Vec<Filter>) -> Self {
        filters.retain(|f| *f != Filter::All);
        match filters.len() {
            0 => Filter::All,
            1 => filters.remove(0),
            _ => Filter::And(filters),
        }
    }

    /// Disjunction; a single filter is returned unwrapped.
    pub fn or(mut filters: Vec<Filter>) -> Self {
        match filters.len() {
            1 => filters.remove(0),
            _ => Filter::Or(filters),
        }
    }

    /// The `_id` this filter pins down by top-level equality, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Filter::Eq(path, Value::String(id)) if path == "_id" => Some(id.as_str()),
            Filter::And(filters) => filters.iter().find_map(|f| f.id()),
            _ => None,
        }
    }

    /// Top-level equality conditions, used to seed upserted documents.
    pub fn equalities(&self) -> Vec<(&str, &Value)> {
        match self {
            Filter::Eq(path, value) if !path.contains('.') => vec![(path.as_str(), value)],
            Filter::And(filters) => filters.iter().flat_map(|f| f.equalities()).collect(),
            _ => Vec::new(),
        }
    }

    /// Evaluate against a document.
    pub fn matches_document(&self, document: &Document) -> bool {
        self.matches_with(&|path| resolve_in_map(document, path))
    }

    /// Evaluate against a value, e.g., an array element in `ElemMatch`.
    pub fn matches(&self, value: &Value) -> bool {
        self.matches_with(&|path| resolve(value, path))
    }

    fn matches_with<'a>(&self, resolver: &dyn Fn(&str) -> Vec<&'a Value>) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(path, expected) => candidates(resolver(path))
                .iter()
                .any(|v| value_eq(v, expected)),
            Filter::Ne(path, expected) => !candidates(resolver(path))
                .iter()
                .any(|v| value_eq(v, expected)),
            Filter::In(path, expected) => candidates(resolver(path))
                .iter()
                .any(|v| expected.iter().any(|e| value_eq(v, e))),
            Filter::Lt(path, x) => any_number(resolver(path), |v| v < *x),
            Filter::Lte(path, x) => any_number(resolver(path), |v| v <= *x),
            Filter::Gt(path, x) => any_number(resolver(path), |v| v > *x),
            Filter::Gte(path, x) => any_number(resolver(path), |v| v >= *x),
            Filter::Regex(path, pattern) => {
                candidates(resolver(path)).iter().any(|v| match v {
                    Value::String(s) => pattern.is_match(s),
                    Value::Number(n) => pattern.is_match(&n.to_string()),
                    _ => false,
                })
            }
            Filter::Exists(path, expected) => !resolver(path).is_empty() == *expected,
            Filter::ElemMatch(path, inner) => resolver(path).iter().any(|v| match v {
                Value::Array(items) => items.iter().any(|item| inner.matches(item)),
                _ => false,
            }),
            Filter::And(filters) => filters.iter().all(|f| f.matches_with(resolver)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches_with(resolver)),
        }
    }
}

/// Values reached by `path` starting at a document.
pub fn resolve_in_map<'a>(document: &'a Document, path: &str) -> Vec<&'a Value> {
    let segments = path.split('.').collect::<Vec<_>>();
    let mut result = Vec::new();
    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = document.get(*head) {
            collect(value, rest, &mut result);
        }
    }
    result
}

/// Values reached by `path` starting at a value.
pub fn resolve<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    let segments = path.split('.').collect::<Vec<_>>();
    let mut result = Vec::new();
    collect(value, &segments, &mut result);
    result
}

fn collect<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                collect(child, rest, out);
            }
        }
        Value::Array(items) => {
            for item in items.iter().filter(|item| item.is_object()) {
                collect(item, segments, out);
            }
        }
        _ => (),
    }
}

/// Flatten arrays one level, keeping the arrays themselves for whole-value equality.
fn candidates(values: Vec<&Value>) -> Vec<&Value> {
    let mut result = Vec::with_capacity(values.len());
    for value in values {
        if let Value::Array(items) = value {
            result.extend(items.iter());
        }
        result.push(value);
    }
    result
}

fn any_number<F: Fn(f64) -> bool>(values: Vec<&Value>, pred: F) -> bool {
    candidates(values)
        .iter()
        .filter_map(|v| v.as_f64())
        .any(pred)
}

/// Value equality where numbers compare numerically, e.g., `5 == 5.0`.
pub fn value_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn document() -> Document {
        let value = json!({
            "_id": "1_1000_A_C",
            "chr": "1",
            "start": 1000,
            "ids": ["rs666"],
            "_at": {"chunkIds": ["1_1_1k", "1_0_10k"]},
            "files": [
                {"fid": "f1", "sid": "s1", "samp": {"def": "0/0", "0/1": [1]}},
                {"fid": "f2", "sid": "s1", "samp": {"def": "0/1", "1/1": [0, 2]}}
            ],
            "st": [{"cid": "ALL", "maf": 0.1, "numGt": {"0/-1": 3}}],
            "annot": {
                "ct": [
                    {"gn": "BRCA2", "so": [1583, 1631], "ps_score": [{"sc": 0.8, "src": "x"}]},
                    {"gn": "BRCA2", "so": [1627]}
                ]
            }
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[rstest::rstest]
    #[case(Filter::eq("chr", "1"), true)]
    #[case(Filter::eq("chr", "2"), false)]
    #[case(Filter::eq("start", 1000.0), true)]
    #[case(Filter::eq("ids", "rs666"), true)]
    #[case(Filter::is_in("_at.chunkIds", vec!["1_0_10k", "9_9_10k"]), true)]
    #[case(Filter::is_in("annot.ct.so", vec![1627]), true)]
    #[case(Filter::is_in("annot.ct.so", vec![1575]), false)]
    #[case(Filter::Gte("st.maf".into(), 0.1), true)]
    #[case(Filter::Lt("st.maf".into(), 0.1), false)]
    #[case(Filter::Gt("st.numGt.0/-1".into(), 2.0), true)]
    #[case(Filter::Exists("annot".into(), true), true)]
    #[case(Filter::Exists("annot".into(), false), false)]
    #[case(Filter::Exists("annot.xrefs".into(), false), true)]
    #[case(Filter::Ne("chr".into(), "1".into()), false)]
    fn leaf_predicates(#[case] filter: Filter, #[case] expected: bool) {
        assert_eq!(filter.matches_document(&document()), expected);
    }

    #[test]
    fn regex_predicate() -> Result<(), anyhow::Error> {
        let filter = Filter::Regex("annot.ct.gn".into(), Pattern::new("^BRC")?);
        assert!(filter.matches_document(&document()));
        let filter = Filter::Regex("annot.ct.gn".into(), Pattern::new("^TP53")?);
        assert!(!filter.matches_document(&document()));
        Ok(())
    }

    #[test]
    fn elem_match_requires_same_element() {
        // f1 has sample 1 as 0/1, f2 has samples 0 and 2 as 1/1
        let same = Filter::elem_match(
            "files",
            Filter::and(vec![Filter::eq("fid", "f2"), Filter::eq("samp.1/1", 2)]),
        );
        let crossed = Filter::elem_match(
            "files",
            Filter::and(vec![Filter::eq("fid", "f1"), Filter::eq("samp.1/1", 2)]),
        );

        assert!(same.matches_document(&document()));
        assert!(!crossed.matches_document(&document()));
    }

    #[test]
    fn elem_match_on_nested_scores() {
        let filter = Filter::elem_match(
            "annot.ct.ps_score",
            Filter::and(vec![Filter::eq("src", "x"), Filter::Gt("sc".into(), 0.5)]),
        );
        assert!(filter.matches_document(&document()));
    }

    #[test]
    fn and_or_combinators() {
        let filter = Filter::or(vec![
            Filter::eq("chr", "2"),
            Filter::and(vec![Filter::eq("chr", "1"), Filter::Lte("start".into(), 1000.0)]),
        ]);
        assert!(filter.matches_document(&document()));
        assert_eq!(Filter::and(vec![]), Filter::All);
        assert_eq!(
            Filter::and(vec![Filter::All, Filter::eq("chr", "1")]),
            Filter::eq("chr", "1")
        );
    }

    #[test]
    fn id_and_equalities() {
        let filter = Filter::and(vec![
            Filter::eq("_id", "1_1000_A_C"),
            Filter::eq("chr", "1"),
            Filter::eq("start", 1000),
            Filter::eq("files.fid", "f1"),
        ]);

        assert_eq!(filter.id(), Some("1_1000_A_C"));
        assert_eq!(
            filter
                .equalities()
                .into_iter()
                .map(|(k, _)| k)
                .collect::<Vec<_>>(),
            vec!["_id", "chr", "start"]
        );
    }
}
