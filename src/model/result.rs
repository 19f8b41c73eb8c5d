//! Result envelope returned by adaptor queries.

/// The result of one query together with timing and messages.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QueryResult<T> {
    /// Identifier of the query, e.g., the region or variant id.
    pub id: String,
    /// Time spent in the database, in milliseconds.
    pub db_time: u128,
    /// Number of records in `result`.
    pub num_results: usize,
    /// Number of matching records when counting was requested, else `num_results`.
    pub num_total_results: u64,
    /// Warnings, one per line.
    pub warning_msg: String,
    /// Errors, one per line.
    pub error_msg: String,
    pub result: Vec<T>,
}

impl<T> QueryResult<T> {
    pub fn new(id: &str, db_time: std::time::Duration, result: Vec<T>) -> Self {
        Self {
            id: id.to_string(),
            db_time: db_time.as_millis(),
            num_results: result.len(),
            num_total_results: result.len() as u64,
            warning_msg: String::new(),
            error_msg: String::new(),
            result,
        }
    }

    /// Append a warning line.
    pub fn add_warning(&mut self, msg: &str) {
        if !self.warning_msg.is_empty() {
            self.warning_msg.push('\n');
        }
        self.warning_msg.push_str(msg);
    }
}
