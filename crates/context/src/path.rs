//! Dotted-path + array-index resolution over a `serde_json::Value` tree.
//!
//! Syntax: a leading `$.` (or bare `$`) is optional; segments are
//! dot-separated; a segment matching `<name>[<int>]` indexes into an
//! array named `<name>` at the preceding level. Traversal fails with a
//! descriptive [`PathError`] on a missing key, an out-of-range index, or
//! an attempt to index into something that isn't an array/object.

use std::fmt;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    MissingKey { path: String, key: String },
    IndexOutOfRange { path: String, index: usize, len: usize },
    NotIndexable { path: String, segment: String },
    MalformedSegment { path: String, segment: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey { path, key } => {
                write!(f, "path `{path}`: missing key `{key}`")
            }
            Self::IndexOutOfRange { path, index, len } => {
                write!(f, "path `{path}`: index {index} out of range (len {len})")
            }
            Self::NotIndexable { path, segment } => {
                write!(f, "path `{path}`: `{segment}` is not indexable")
            }
            Self::MalformedSegment { path, segment } => {
                write!(f, "path `{path}`: malformed segment `{segment}`")
            }
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for flowmesh_error::FlowError {
    fn from(err: PathError) -> Self {
        flowmesh_error::FlowError::resolution(err.to_string())
    }
}

fn segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z0-9_]+)((?:\[\d+\])*)$").expect("static regex"))
}

fn index_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("static regex"))
}

/// Strip an optional leading `$.` or bare `$`.
fn strip_root_prefix(path: &str) -> &str {
    path.strip_prefix("$.")
        .or_else(|| path.strip_prefix('$'))
        .unwrap_or(path)
}

/// Resolve `path` against `root`.
pub fn get_value(root: &Value, path: &str) -> Result<Value, PathError> {
    let stripped = strip_root_prefix(path);
    if stripped.is_empty() {
        return Ok(root.clone());
    }

    let mut current = root;
    for segment in stripped.split('.') {
        let caps = segment_regex().captures(segment).ok_or_else(|| PathError::MalformedSegment {
            path: path.to_owned(),
            segment: segment.to_owned(),
        })?;
        let name = &caps[1];
        let indices_str = &caps[2];

        current = current.get(name).ok_or_else(|| PathError::MissingKey {
            path: path.to_owned(),
            key: name.to_owned(),
        })?;

        for cap in index_regex().captures_iter(indices_str) {
            let index: usize = cap[1].parse().expect("regex guarantees digits");
            let arr = current.as_array().ok_or_else(|| PathError::NotIndexable {
                path: path.to_owned(),
                segment: segment.to_owned(),
            })?;
            current = arr.get(index).ok_or_else(|| PathError::IndexOutOfRange {
                path: path.to_owned(),
                index,
                len: arr.len(),
            })?;
        }
    }

    Ok(current.clone())
}

/// Resolve an `input_mapping`: any string value starting with `$` is
/// treated as a path and substituted via [`get_value`]; everything else
/// (including non-string JSON values) passes through verbatim. The first
/// unresolvable path fails the whole mapping.
pub fn resolve_input_mapping(
    root: &Value,
    mapping: &IndexMap<String, Value>,
) -> Result<IndexMap<String, Value>, PathError> {
    let mut resolved = IndexMap::with_capacity(mapping.len());
    for (key, value) in mapping {
        let substituted = match value.as_str() {
            Some(s) if s.starts_with('$') => get_value(root, s)?,
            _ => value.clone(),
        };
        resolved.insert(key.clone(), substituted);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "trigger": {"a": {"items": [10]}},
            "nodes": {"n1": {"output": {"value": 42}, "status": "success"}}
        })
    }

    #[test]
    fn leading_dollar_dot_is_optional() {
        let root = sample();
        assert_eq!(get_value(&root, "$.trigger.a.items[0]").unwrap(), json!(10));
        assert_eq!(get_value(&root, "trigger.a.items[0]").unwrap(), json!(10));
    }

    #[test]
    fn index_out_of_range_when_list_has_one_element() {
        let root = sample();
        assert!(get_value(&root, "$.trigger.a.items[5]").is_err());
    }

    #[test]
    fn missing_key_errors() {
        let root = sample();
        let err = get_value(&root, "$.trigger.missing").unwrap_err();
        assert!(matches!(err, PathError::MissingKey { .. }));
    }

    #[test]
    fn non_indexable_intermediate_errors() {
        let root = sample();
        let err = get_value(&root, "$.nodes.n1.output.value[0]").unwrap_err();
        assert!(matches!(err, PathError::NotIndexable { .. }));
    }

    #[test]
    fn input_mapping_passes_through_non_path_literals() {
        let root = sample();
        let mut mapping = IndexMap::new();
        mapping.insert("url".to_owned(), json!("$.trigger.a.items[0]"));
        mapping.insert("literal".to_owned(), json!(5));
        let resolved = resolve_input_mapping(&root, &mapping).unwrap();
        assert_eq!(resolved["url"], json!(10));
        assert_eq!(resolved["literal"], json!(5));
    }

    #[test]
    fn input_mapping_fails_whole_resolution_on_bad_path() {
        let root = sample();
        let mut mapping = IndexMap::new();
        mapping.insert("ok".to_owned(), json!("$.trigger.a.items[0]"));
        mapping.insert("bad".to_owned(), json!("$.trigger.nope"));
        assert!(resolve_input_mapping(&root, &mapping).is_err());
    }
}
