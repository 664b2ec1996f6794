//! Query compilation
//!
//! Turns an [`ExportConfig`] into the request body of the initial search.
//! Three sources are supported, in order of precedence:
//!
//! 1. A raw request body, sent verbatim
//! 2. A query file referenced as `@path`
//! 3. A boolean query synthesized from match filters and a range filter
//!
//! For the last two, field selection and sort directives are attached to
//! the compiled body.

use std::path::Path;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::config::ExportConfig;
use crate::error::{ConfigError, Result};

/// Prefix marking the query source as a file reference.
pub const QUERY_FILE_MARKER: char = '@';

/// Compiled request body for the initial search.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryDocument {
    /// Caller-supplied body, sent as-is
    Raw(String),
    /// Body compiled from configuration
    Structured(Value),
}

impl QueryDocument {
    /// Render the document as request body text
    pub fn to_body(&self) -> String {
        match self {
            QueryDocument::Raw(text) => text.clone(),
            QueryDocument::Structured(value) => value.to_string(),
        }
    }

    /// Structured body, if this document was compiled
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            QueryDocument::Raw(_) => None,
            QueryDocument::Structured(value) => Some(value),
        }
    }
}

/// Compile the query document for an export session
///
/// # Arguments
/// * `config` - Export configuration
///
/// # Returns
/// * `Result<QueryDocument>` - Compiled document, or a config error when a
///   referenced query file cannot be read or parsed
pub fn build_query(config: &ExportConfig) -> Result<QueryDocument> {
    if !config.raw_query.is_empty() {
        debug!(query = %config.raw_query, "Using raw query");
        return Ok(QueryDocument::Raw(config.raw_query.clone()));
    }

    let mut body = Map::new();
    body.insert("query".to_string(), json!({ "match_all": {} }));

    if let Some(path) = config.query.strip_prefix(QUERY_FILE_MARKER) {
        // Keys from the file replace the defaults.
        body.extend(load_query_file(Path::new(path))?);
    } else {
        body.insert("query".to_string(), bool_query(config));
    }

    if !config.fields.is_empty() {
        debug!(fields = ?config.fields, "Selecting source fields");
        body.insert("_source".to_string(), json!(config.fields));
    }

    let sort = sort_clause(&config.sort);
    if !sort.is_empty() {
        body.insert("sort".to_string(), Value::Array(sort));
    }

    let body = Value::Object(body);
    debug!(query = %body, "Compiled query");
    Ok(QueryDocument::Structured(body))
}

/// Read a JSON query object from disk
fn load_query_file(path: &Path) -> Result<Map<String, Value>> {
    let file_error = |reason: String| ConfigError::InvalidQueryFile {
        path: path.display().to_string(),
        reason,
    };

    let content = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
    match serde_json::from_str::<Value>(&content).map_err(|e| file_error(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(file_error(format!("expected a JSON object, found {}", json_kind(&other))).into()),
    }
}

/// Synthesize `{"bool": {"must": [match, range, query_string?]}}`
fn bool_query(config: &ExportConfig) -> Value {
    let mut must = vec![
        json!({ "match": match_clause(&config.match_all) }),
        json!({ "range": range_clause(&config.range_field, &config.range_values) }),
    ];

    if !config.query.is_empty() {
        must.push(json!({ "query_string": { "query": config.query } }));
    }

    json!({ "bool": { "must": must } })
}

/// Build the match object from `field:value` entries.
///
/// Entries that do not split into exactly two parts are dropped.
pub fn match_clause(entries: &[String]) -> Map<String, Value> {
    entries
        .iter()
        .filter_map(|entry| split_pair(entry))
        .map(|(field, value)| (field.to_string(), Value::String(value.to_string())))
        .collect()
}

/// Build the range object over `field`.
///
/// `values[0]` is the inclusive lower bound, `values[1]` the exclusive
/// upper bound. No values or no field yields an empty object.
pub fn range_clause(field: &str, values: &[String]) -> Map<String, Value> {
    let mut range = Map::new();
    if field.is_empty() || values.is_empty() {
        return range;
    }

    let mut bounds = Map::new();
    bounds.insert("gte".to_string(), Value::String(values[0].clone()));
    if let Some(upper) = values.get(1) {
        bounds.insert("lt".to_string(), Value::String(upper.clone()));
    }
    range.insert(field.to_string(), Value::Object(bounds));
    range
}

/// Build the sort list from `field:direction` entries, keeping order.
pub fn sort_clause(entries: &[String]) -> Vec<Value> {
    entries
        .iter()
        .filter_map(|entry| split_pair(entry))
        .map(|(field, direction)| {
            let mut item = Map::new();
            item.insert(field.to_string(), Value::String(direction.to_string()));
            Value::Object(item)
        })
        .collect()
}

fn split_pair(entry: &str) -> Option<(&str, &str)> {
    let mut parts = entry.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(left), Some(right), None) => Some((left, right)),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
