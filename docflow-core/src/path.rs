// src/path.rs
//! Dot-path addressing over raw containers
//!
//! Paths are split on `.` into [`Key`] segments before any traversal, so the
//! functions here work on segment slices. Bucket paths built by the
//! aggregation pipeline reuse them directly, which keeps group values that
//! contain a `.` in a single segment.

use crate::document::{Container, Document, Key, Number, Scalar};
use crate::error::{DocflowError, Result};
use crate::value_utils::cached_regex;
use indexmap::IndexMap;

/// Result of [`wildcard_match`]
#[derive(Debug, Clone, PartialEq)]
pub enum WildcardMatch {
    /// Matched leaves in traversal order
    Values(Vec<Scalar>),
    /// Matched leaves keyed by their flattened path
    Keyed(IndexMap<String, Scalar>),
}

impl WildcardMatch {
    pub fn len(&self) -> usize {
        match self {
            WildcardMatch::Values(v) => v.len(),
            WildcardMatch::Keyed(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split a dot path into segments; empty paths and empty segments are errors
pub fn parse_path(path: &str) -> Result<Vec<Key>> {
    if path.is_empty() {
        return Err(DocflowError::structural("empty path"));
    }
    path.split('.')
        .map(|segment| {
            if segment.is_empty() {
                Err(DocflowError::structural(format!(
                    "empty segment in path '{}'",
                    path
                )))
            } else {
                Ok(Key::parse(segment))
            }
        })
        .collect()
}

/// Render segments back to dot form for messages
pub fn display_path(segments: &[Key]) -> String {
    segments
        .iter()
        .map(Key::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

pub fn get_path<'a>(root: &'a Container, segments: &[Key]) -> Option<&'a Document> {
    let (first, rest) = segments.split_first()?;
    let mut value = root.get(first)?;
    for segment in rest {
        match value {
            Document::Container(c) => value = c.get(segment)?,
            Document::Scalar(_) => return None,
        }
    }
    Some(value)
}

pub fn get_path_mut<'a>(root: &'a mut Container, segments: &[Key]) -> Option<&'a mut Document> {
    let (first, rest) = segments.split_first()?;
    let mut value = root.get_mut(first)?;
    for segment in rest {
        match value {
            Document::Container(c) => value = c.get_mut(segment)?,
            Document::Scalar(_) => return None,
        }
    }
    Some(value)
}

/// Overwrite-or-insert at `segments`, creating missing intermediate containers.
/// A scalar on the way is a structural conflict and is left untouched.
pub fn set_path(root: &mut Container, segments: &[Key], value: Document) -> Result<()> {
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| DocflowError::structural("empty path"))?;

    let mut current = root;
    for (depth, segment) in parents.iter().enumerate() {
        current = current.child_container_mut(segment).ok_or_else(|| {
            DocflowError::structural(format!(
                "cannot set '{}': '{}' holds a scalar",
                display_path(segments),
                display_path(&segments[..=depth])
            ))
        })?;
    }
    current.insert(last.clone(), value);
    Ok(())
}

/// Remove and return the leaf at `segments`
pub fn unset_path(root: &mut Container, segments: &[Key]) -> Option<Document> {
    let (last, parents) = segments.split_last()?;
    if parents.is_empty() {
        return root.remove(last);
    }
    match get_path_mut(root, parents)? {
        Document::Container(parent) => parent.remove(last),
        Document::Scalar(_) => None,
    }
}

pub fn increment_path(root: &mut Container, segments: &[Key], delta: Number) -> Result<Number> {
    let current = match get_path(root, segments) {
        None | Some(Document::Scalar(Scalar::Null)) => Number::Int(0),
        Some(Document::Scalar(s)) => s.as_number().ok_or_else(|| {
            DocflowError::structural(format!(
                "cannot increment '{}': {} is not numeric",
                display_path(segments),
                s.type_name()
            ))
        })?,
        Some(Document::Container(_)) => {
            return Err(DocflowError::structural(format!(
                "cannot increment '{}': it holds a container",
                display_path(segments)
            )))
        }
    };
    let updated = current.add(delta);
    set_path(root, segments, Document::from(updated))?;
    Ok(updated)
}

/// Append without deduplication; a scalar already there becomes `[old, value]`
pub fn add_to_set_path(root: &mut Container, segments: &[Key], value: Document) -> Result<()> {
    let clean = root.is_clean();
    if clean && value.is_empty_leaf() {
        return Ok(());
    }
    match get_path_mut(root, segments) {
        Some(Document::Container(list)) => {
            list.push(value);
            Ok(())
        }
        Some(existing) => {
            let old = std::mem::take(existing);
            *existing = Document::from(vec![old, value]);
            if let (true, Document::Container(list)) = (clean, existing) {
                list.make_clean();
            }
            Ok(())
        }
        None => set_path(root, segments, Document::from(vec![value])),
    }
}

/// One clone of `root` per element of the container at `segments`
pub fn unwind_path(root: &Container, segments: &[Key]) -> Result<Vec<Container>> {
    let items = match get_path(root, segments) {
        Some(Document::Container(items)) => items,
        _ => return Ok(Vec::new()),
    };

    let mut rows = Vec::with_capacity(items.len());
    for item in items.values() {
        let mut row = root.clone();
        set_path(&mut row, segments, item.clone())?;
        rows.push(row);
    }
    Ok(rows)
}

/// Depth-first map of `/seg1/seg2` keys to scalar leaves
pub fn flatten(root: &Container) -> IndexMap<String, Scalar> {
    let mut out = IndexMap::new();
    flatten_into(root, "", &mut out);
    out
}

fn flatten_into(container: &Container, prefix: &str, out: &mut IndexMap<String, Scalar>) {
    for (key, value) in container.iter() {
        let path = format!("{}/{}", prefix, key);
        match value {
            Document::Scalar(s) => {
                out.insert(path, s.clone());
            }
            Document::Container(child) => flatten_into(child, &path, out),
        }
    }
}

/// Compile a `*` pattern into an anchored regex: each `*` matches any
/// characters (non-greedy), everything else is literal.
fn wildcard_regex(pattern: &str) -> String {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*?");
    format!("^{}$", body)
}

/// Match flattened keys against `pattern`; a missing leading `/` is implied.
/// Without a `*`, the pattern is an exact key lookup.
pub fn wildcard_match(
    flat: &IndexMap<String, Scalar>,
    pattern: &str,
    keyed: bool,
) -> Result<WildcardMatch> {
    let pattern = if pattern.starts_with('/') {
        pattern.to_string()
    } else {
        format!("/{}", pattern)
    };

    let matched: Vec<(&String, &Scalar)> = if pattern.contains('*') {
        let re = cached_regex(&wildcard_regex(&pattern), "")?;
        flat.iter().filter(|(k, _)| re.is_match(k)).collect()
    } else {
        flat.get_key_value(&pattern).into_iter().collect()
    };

    Ok(if keyed {
        WildcardMatch::Keyed(
            matched
                .into_iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    } else {
        WildcardMatch::Values(matched.into_iter().map(|(_, v)| v.clone()).collect())
    })
}
