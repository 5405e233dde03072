//! Structural diff over JSON values.
//!
//! `serde_json::Value` is walked as a tagged tree of three node kinds:
//! objects (compared key by key), arrays (compared index by index) and
//! leaves (compared by equality). Paths are dot-delimited; array elements
//! contribute their index as a segment, e.g. `medications.2.dose`. An object
//! key containing `.` or `\` has those characters escaped with a backslash,
//! so the key `score.total` appears as `score\.total`.
//!
//! Array policy: elements are matched strictly by position. A reordered
//! array reports every shifted index as a conflict, and when lengths differ
//! each index past the shorter side is reported on its own.

use serde_json::{Map, Value};

/// Returns the path of every leaf that differs between `a` and `b`.
///
/// A key present on only one side, or a node that is an object/array on one
/// side and something else on the other, is reported at that node's path
/// without descending further. Identical inputs yield an empty list.
pub fn diff_paths(a: &Value, b: &Value) -> Vec<String> {
    let mut out = Vec::new();
    walk(a, b, "", &mut out);
    out
}

fn walk(a: &Value, b: &Value, path: &str, out: &mut Vec<String>) {
    match (a, b) {
        (Value::Object(left), Value::Object(right)) => walk_objects(left, right, path, out),
        (Value::Array(left), Value::Array(right)) => {
            let longest = left.len().max(right.len());
            for i in 0..longest {
                let child = join(path, &i.to_string());
                match (left.get(i), right.get(i)) {
                    (Some(l), Some(r)) => walk(l, r, &child, out),
                    _ => out.push(child),
                }
            }
        }
        (l, r) if l == r => {}
        _ => out.push(path.to_string()),
    }
}

fn walk_objects(left: &Map<String, Value>, right: &Map<String, Value>, path: &str, out: &mut Vec<String>) {
    for (key, l) in left {
        let child = join(path, key);
        match right.get(key) {
            Some(r) => walk(l, r, &child, out),
            None => out.push(child),
        }
    }
    for key in right.keys() {
        if !left.contains_key(key) {
            out.push(join(path, key));
        }
    }
}

fn join(base: &str, key: &str) -> String {
    let mut out = String::with_capacity(base.len() + key.len() + 1);
    if !base.is_empty() {
        out.push_str(base);
        out.push('.');
    }
    for c in key.chars() {
        if c == '.' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Splits a path produced by [`diff_paths`] back into raw segments,
/// unescaping `\.` and `\\`. The empty path has no segments.
pub fn split_path(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
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
            other => current.push(other),
        }
    }
    segments.push(current);
    segments
}

/// Reads the value at a dot path. The empty path addresses the root.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    split_path(path).iter().try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(segment.as_str()),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Writes `new` at a dot path, or removes the node when `new` is `None`.
///
/// Missing intermediate objects are created. Writing past the end of an
/// array pads it with nulls; removing an array element replaces it with null
/// so sibling indices keep their meaning.
pub fn set_path(root: &mut Value, path: &str, new: Option<Value>) {
    if path.is_empty() {
        *root = new.unwrap_or(Value::Null);
        return;
    }

    let segments = split_path(path);
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return,
    };

    let mut node = root;
    for segment in parents {
        node = match node {
            Value::Array(items) => match segment.parse::<usize>() {
                Ok(i) => {
                    if i >= items.len() {
                        items.resize(i + 1, Value::Null);
                    }
                    if items[i].is_null() {
                        items[i] = Value::Object(Map::new());
                    }
                    &mut items[i]
                }
                Err(_) => return,
            },
            other => {
                if !other.is_object() {
                    *other = Value::Object(Map::new());
                }
                match other {
                    Value::Object(map) => map
                        .entry(segment.clone())
                        .or_insert_with(|| Value::Object(Map::new())),
                    _ => return,
                }
            }
        };
    }

    match node {
        Value::Array(items) => {
            let Ok(i) = last.parse::<usize>() else { return };
            match new {
                Some(v) => {
                    if i >= items.len() {
                        items.resize(i + 1, Value::Null);
                    }
                    items[i] = v;
                }
                None => {
                    // Trailing removals shrink the array; interior ones null out.
                    if i + 1 == items.len() {
                        items.pop();
                    } else if i < items.len() {
                        items[i] = Value::Null;
                    }
                }
            }
        }
        Value::Object(map) => match new {
            Some(v) => {
                map.insert(last.clone(), v);
            }
            None => {
                map.remove(last.as_str());
            }
        },
        other => {
            if let Some(v) = new {
                let mut map = Map::new();
                map.insert(last.clone(), v);
                *other = Value::Object(map);
            }
        }
    }
}
