use crate::errors::TaskError;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Splits `a.b[0].c` into segments. Empty segments are dropped.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    for ch in path.trim().chars() {
        match ch {
            '.' | '[' | ']' => {
                if !current.trim().is_empty() {
                    segments.push(segment_from(&current));
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        segments.push(segment_from(&current));
    }
    segments
}

fn segment_from(raw: &str) -> PathSegment {
    let trimmed = raw.trim().trim_matches('"').trim_matches('\'').trim();
    if let Ok(index) = trimmed.parse::<usize>() {
        return PathSegment::Index(index);
    }
    PathSegment::Key(trimmed.to_string())
}

/// Walks `path` through `target`; `None` as soon as a segment is missing.
pub fn get_path_value<'a>(target: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = target;
    for segment in parse_path(path) {
        current = match segment {
            PathSegment::Key(key) => current.get(key.as_str())?,
            PathSegment::Index(index) => current.as_array()?.get(index)?,
        };
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate objects. Index segments
/// must address existing array slots.
pub fn set_path_value(target: &mut Value, path: &str, value: Value) -> Result<(), TaskError> {
    let segments = parse_path(path);
    if segments.is_empty() {
        return Err(TaskError::invalid_params("Path must be a non-empty string"));
    }
    let mut current = target;
    for (idx, segment) in segments.iter().enumerate() {
        let last = idx + 1 == segments.len();
        current = match segment {
            PathSegment::Key(key) => {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                let map = current
                    .as_object_mut()
                    .ok_or_else(|| TaskError::invalid_params("Path target is not an object"))?;
                if last {
                    map.insert(key.clone(), value);
                    return Ok(());
                }
                map.entry(key.clone()).or_insert(Value::Null)
            }
            PathSegment::Index(index) => {
                let slot = current
                    .as_array_mut()
                    .and_then(|arr| arr.get_mut(*index))
                    .ok_or_else(|| {
                        TaskError::invalid_params(format!("Path '{}' index out of range", path))
                    })?;
                if last {
                    *slot = value;
                    return Ok(());
                }
                slot
            }
        };
    }
    Ok(())
}
