//! Document handle with path-based field access
//!
//! Hits are kept as parsed JSON trees rather than deserialized into fixed
//! structures. Fields are looked up by dotted path: `a.b` walks objects,
//! numeric segments index arrays (`tags.0`), and `\.` escapes a literal dot
//! in a key (`host\.name`).

use serde_json::Value;

/// One hit `_source` returned by the search service
#[derive(Debug, Clone, PartialEq)]
pub struct Document(Value);

impl Document {
    /// Wrap a parsed JSON tree
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Underlying JSON tree
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Look up a value by dotted path
    ///
    /// # Arguments
    /// * `path` - Dotted path, e.g. `user.name` or `tags.0`
    ///
    /// # Returns
    /// * `Option<&Value>` - The value, or None when any segment is missing
    pub fn get(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return None;
        }

        // A key containing literal dots takes precedence over traversal.
        if let Some(value) = self.0.get(path) {
            return Some(value);
        }

        split_path(path)
            .iter()
            .try_fold(&self.0, |current, segment| match current {
                Value::Object(map) => map.get(segment.as_str()),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    /// Look up a value by dotted path and render it as text
    ///
    /// Strings are returned as-is, numbers and booleans as their literal
    /// text, objects and arrays as compact JSON. Missing fields and nulls
    /// yield None.
    pub fn get_scalar(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }
}

fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => current.push('\\'),
            },
            '.' => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}
