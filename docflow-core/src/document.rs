// src/document.rs
//! Recursive document value
//!
//! A [`Document`] is either a [`Scalar`] or an ordered [`Container`] whose keys
//! are non-negative integers or strings. Containers keep insertion order and
//! serialize as a JSON list when their keys are exactly `0..n` in order,
//! otherwise as a JSON object.

use crate::error::{DocflowError, Result};
use crate::path::{self, WildcardMatch};
use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;
use std::fmt;

// ============================================================================
// KEYS
// ============================================================================

/// Container key
///
/// Segments and object keys spelled as canonical decimal integers ("0", "17",
/// never "007") are integer keys, so `"items.0"` addresses the first element
/// of a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Index(u64),
    Name(String),
}

impl Key {
    pub fn parse(segment: &str) -> Key {
        let canonical = !segment.is_empty()
            && segment.bytes().all(|b| b.is_ascii_digit())
            && (segment == "0" || !segment.starts_with('0'));
        if canonical {
            if let Ok(index) = segment.parse::<u64>() {
                return Key::Index(index);
            }
        }
        Key::Name(segment.to_string())
    }

    pub fn as_index(&self) -> Option<u64> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Name(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{}", i),
            Key::Name(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::parse(s)
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::parse(&s)
    }
}

impl From<u64> for Key {
    fn from(i: u64) -> Self {
        Key::Index(i)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i as u64)
    }
}

// ============================================================================
// SCALARS AND NUMBERS
// ============================================================================

/// Leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Numeric value used by `increment` and the sum accumulators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Integer addition stays integral until it would overflow
    pub fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_add(b)
                .map(Number::Int)
                .unwrap_or(Number::Float(a as f64 + b as f64)),
            (a, b) => Number::Float(a.as_f64() + b.as_f64()),
        }
    }

    pub fn neg(self) -> Number {
        match self {
            Number::Int(i) => i
                .checked_neg()
                .map(Number::Int)
                .unwrap_or(Number::Float(-(i as f64))),
            Number::Float(f) => Number::Float(-f),
        }
    }
}

impl From<i64> for Number {
    fn from(i: i64) -> Self {
        Number::Int(i)
    }
}

impl From<i32> for Number {
    fn from(i: i32) -> Self {
        Number::Int(i as i64)
    }
}

impl From<usize> for Number {
    fn from(n: usize) -> Self {
        i64::try_from(n)
            .map(Number::Int)
            .unwrap_or(Number::Float(n as f64))
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number::Float(f)
    }
}

impl From<Number> for Scalar {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => Scalar::Int(i),
            Number::Float(f) => Scalar::Float(f),
        }
    }
}

impl Scalar {
    /// Runtime type name, as used by the `type` operator
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::String(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Numeric view: numbers, and strings holding a decimal number
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Scalar::Int(i) => Some(Number::Int(*i)),
            Scalar::Float(f) => Some(Number::Float(*f)),
            Scalar::String(s) => parse_number(s),
            Scalar::Null | Scalar::Bool(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness: null, false, 0, 0.0, "" and "0" are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Null => false,
            Scalar::Bool(b) => *b,
            Scalar::Int(i) => *i != 0,
            Scalar::Float(f) => *f != 0.0,
            Scalar::String(s) => !s.is_empty() && s != "0",
        }
    }

    /// Text form used for bucket keys and string casts
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::String(s) => s.clone(),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::String(s) => Value::String(s.clone()),
        }
    }
}

pub(crate) fn parse_number(s: &str) -> Option<Number> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Number::Int(i));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Number::Float)
}

// ============================================================================
// CONTAINER
// ============================================================================

/// Ordered key/value container
///
/// Tracks whether a write was ever attempted on it so that a freshly
/// constructed empty container ("undefined") can be told apart from one that
/// was explicitly emptied.
///
/// A clean container never stores `null` or `""` leaves. The flag is carried
/// by every container stored inside it, so writes at any depth are filtered.
#[derive(Debug, Clone, Default)]
pub struct Container {
    entries: IndexMap<Key, Document>,
    touched: bool,
    clean: bool,
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Container {
    pub fn new() -> Self {
        Container::default()
    }

    /// Empty container in clean mode
    pub fn new_clean() -> Self {
        Container {
            clean: true,
            ..Container::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.clean
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_undefined(&self) -> bool {
        self.entries.is_empty() && !self.touched
    }

    pub(crate) fn touch(&mut self) {
        self.touched = true;
    }

    pub fn get(&self, key: &Key) -> Option<&Document> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &Key) -> Option<&mut Document> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    /// Overwrite-or-insert; an existing key keeps its position.
    /// In clean mode a `null` or `""` value removes the key instead, and an
    /// inserted container is cleaned recursively.
    pub fn insert(&mut self, key: Key, mut value: Document) -> Option<Document> {
        self.touched = true;
        if self.clean {
            if value.is_empty_leaf() {
                return self.entries.shift_remove(&key);
            }
            if let Document::Container(child) = &mut value {
                child.make_clean();
            }
        }
        self.entries.insert(key, value)
    }

    /// Remove a key, keeping the order of the remaining entries
    pub fn remove(&mut self, key: &Key) -> Option<Document> {
        self.touched = true;
        self.entries.shift_remove(key)
    }

    /// One past the greatest integer key, or 0
    pub fn next_index(&self) -> u64 {
        self.entries
            .keys()
            .filter_map(Key::as_index)
            .max()
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    pub fn push(&mut self, value: Document) {
        let key = Key::Index(self.next_index());
        self.insert(key, value);
    }

    /// Keys are exactly `0..n` in order
    pub fn is_list(&self) -> bool {
        self.entries
            .keys()
            .enumerate()
            .all(|(i, k)| k.as_index() == Some(i as u64))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Document> {
        self.entries.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Document)> {
        self.entries.iter()
    }

    /// Child container at `key`, created when missing; `None` if a scalar sits there
    pub(crate) fn child_container_mut(&mut self, key: &Key) -> Option<&mut Container> {
        if !self.entries.contains_key(key) {
            self.insert(key.clone(), Document::new());
        }
        match self.entries.get_mut(key) {
            Some(Document::Container(child)) => Some(child),
            _ => None,
        }
    }

    /// Recursive replace: incoming leaves win, containers on both sides merge
    pub fn merge(&mut self, other: Container) {
        self.touched = true;
        for (key, incoming) in other.entries {
            let nested = matches!(
                (self.entries.get(&key), &incoming),
                (Some(Document::Container(_)), Document::Container(_))
            );
            if nested {
                if let (Some(Document::Container(current)), Document::Container(incoming)) =
                    (self.entries.get_mut(&key), incoming)
                {
                    current.merge(incoming);
                }
            } else {
                self.insert(key, incoming);
            }
        }
    }

    /// Switch to clean mode here and below, dropping existing empty leaves.
    /// Containers emptied by this are kept.
    pub fn make_clean(&mut self) {
        self.clean = true;
        self.entries.retain(|_, value| match value {
            Document::Container(child) => {
                child.make_clean();
                true
            }
            leaf => !leaf.is_empty_leaf(),
        });
    }
}

impl IntoIterator for Container {
    type Item = (Key, Document);
    type IntoIter = indexmap::map::IntoIter<Key, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(Key, Document)> for Container {
    fn from_iter<T: IntoIterator<Item = (Key, Document)>>(iter: T) -> Self {
        Container {
            entries: iter.into_iter().collect(),
            touched: false,
            clean: false,
        }
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// Nested document: a scalar leaf or an ordered container of documents
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Scalar(Scalar),
    Container(Container),
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

impl Document {
    /// New empty, undefined container
    pub fn new() -> Self {
        Document::Container(Container::new())
    }

    /// New empty, undefined container in clean mode
    pub fn new_clean() -> Self {
        Document::Container(Container::new_clean())
    }

    /// Build from a parsed JSON value
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Document::Scalar(Scalar::Null),
            Value::Bool(b) => Document::Scalar(Scalar::Bool(*b)),
            Value::Number(n) => Document::Scalar(match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Float(n.as_f64().unwrap_or(0.0)),
            }),
            Value::String(s) => Document::Scalar(Scalar::String(s.clone())),
            Value::Array(items) => Document::Container(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (Key::from(i), Document::from_value(item)))
                    .collect(),
            ),
            Value::Object(map) => Document::Container(
                map.iter()
                    .map(|(k, v)| (Key::parse(k), Document::from_value(v)))
                    .collect(),
            ),
        }
    }

    /// Build from a parsed JSON value, dropping `null` and `""` leaves at every depth
    pub fn from_value_clean(value: &Value) -> Self {
        let mut doc = Document::from_value(value);
        if let Document::Container(c) = &mut doc {
            c.make_clean();
        }
        doc
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Ok(Document::from_value(&value))
    }

    pub fn from_json_clean(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Ok(Document::from_value_clean(&value))
    }

    /// Plain nested JSON view
    pub fn to_value(&self) -> Value {
        match self {
            Document::Scalar(s) => s.to_value(),
            Document::Container(c) if c.is_list() => {
                Value::Array(c.values().map(Document::to_value).collect())
            }
            Document::Container(c) => Value::Object(
                c.iter()
                    .map(|(k, v)| (k.to_string(), v.to_value()))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn is_scalar(&self) -> bool {
        matches!(self, Document::Scalar(_))
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Document::Container(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Document::Container(c) if c.is_list())
    }

    /// Container in clean mode; scalars are never clean
    pub fn is_clean(&self) -> bool {
        matches!(self, Document::Container(c) if c.is_clean())
    }

    /// `null` or `""`, the leaves a clean container refuses
    pub(crate) fn is_empty_leaf(&self) -> bool {
        match self {
            Document::Scalar(Scalar::Null) => true,
            Document::Scalar(Scalar::String(s)) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Document::Scalar(s) => Some(s),
            Document::Container(_) => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Document::Container(c) => Some(c),
            Document::Scalar(_) => None,
        }
    }

    pub fn as_container_mut(&mut self) -> Option<&mut Container> {
        match self {
            Document::Container(c) => Some(c),
            Document::Scalar(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        self.as_scalar().and_then(Scalar::as_number)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.as_scalar()? {
            Scalar::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(Number::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    /// Entry count; scalars count as zero
    pub fn len(&self) -> usize {
        self.as_container().map(Container::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty container on which no write was ever attempted
    pub fn is_undefined(&self) -> bool {
        matches!(self, Document::Container(c) if c.is_undefined())
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Document::Scalar(s) => s.is_truthy(),
            Document::Container(c) => !c.is_empty(),
        }
    }

    /// Runtime type name; every container reports `"array"`
    pub fn type_name(&self) -> &'static str {
        match self {
            Document::Scalar(s) => s.type_name(),
            Document::Container(_) => "array",
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.as_container().into_iter().flat_map(Container::keys)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Document)> {
        self.as_container().into_iter().flat_map(Container::iter)
    }

    fn root_mut(&mut self, op: &str) -> Result<&mut Container> {
        match self {
            Document::Container(c) => {
                c.touch();
                Ok(c)
            }
            Document::Scalar(s) => Err(DocflowError::structural(format!(
                "cannot {} on a scalar document ({})",
                op,
                s.type_name()
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Path addressing
    // ------------------------------------------------------------------

    /// Resolve a dot path; `None` when a segment is missing, a scalar is
    /// reached before the end, or the path is malformed.
    pub fn get(&self, path: &str) -> Option<&Document> {
        let segments = path::parse_path(path).ok()?;
        path::get_path(self.as_container()?, &segments)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Document> {
        let segments = path::parse_path(path).ok()?;
        path::get_path_mut(self.as_container_mut()?, &segments)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Write `value` at `path`, creating intermediate containers
    pub fn set(&mut self, path: &str, value: impl Into<Document>) -> Result<()> {
        let segments = path::parse_path(path)?;
        path::set_path(self.root_mut("set")?, &segments, value.into())
    }

    /// Append at the next integer key
    pub fn append(&mut self, value: impl Into<Document>) -> Result<()> {
        self.root_mut("append")?.push(value.into());
        Ok(())
    }

    /// Remove and return the value at `path`
    pub fn unset(&mut self, path: &str) -> Result<Option<Document>> {
        let segments = path::parse_path(path)?;
        Ok(path::unset_path(self.root_mut("unset")?, &segments))
    }

    /// Add `delta` to the number at `path` (absent counts as 0) and return the new value
    pub fn increment(&mut self, path: &str, delta: impl Into<Number>) -> Result<Number> {
        let segments = path::parse_path(path)?;
        path::increment_path(self.root_mut("increment")?, &segments, delta.into())
    }

    /// Append to the list at `path`, creating it or promoting a scalar to `[old, value]`
    pub fn add_to_set(&mut self, path: &str, value: impl Into<Document>) -> Result<()> {
        let segments = path::parse_path(path)?;
        path::add_to_set_path(self.root_mut("addToSet")?, &segments, value.into())
    }

    /// One clone of this document per element of the container at `path`,
    /// each with `path` replaced by that element. Empty when `path` does not
    /// hold a container.
    pub fn unwind(&self, path: &str) -> Result<Vec<Document>> {
        let segments = path::parse_path(path)?;
        match self {
            Document::Container(c) => Ok(path::unwind_path(c, &segments)?
                .into_iter()
                .map(Document::Container)
                .collect()),
            Document::Scalar(_) => Ok(Vec::new()),
        }
    }

    /// Every scalar leaf keyed by its `/`-joined path
    pub fn flatten(&self) -> IndexMap<String, Scalar> {
        match self {
            Document::Container(c) => path::flatten(c),
            Document::Scalar(_) => IndexMap::new(),
        }
    }

    /// Match flattened keys against a `*` pattern such as `/items/*/id`
    pub fn wildcard_match(&self, pattern: &str, keyed: bool) -> Result<WildcardMatch> {
        path::wildcard_match(&self.flatten(), pattern, keyed)
    }

    /// Layer `other` over this document (see [`Container::merge`]).
    /// A scalar on either side is replaced by `other`.
    pub fn merge(&mut self, other: Document) {
        match (self, other) {
            (Document::Container(current), Document::Container(incoming)) => {
                current.merge(incoming)
            }
            (current, incoming) => *current = incoming,
        }
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<Scalar> for Document {
    fn from(s: Scalar) -> Self {
        Document::Scalar(s)
    }
}

impl From<Container> for Document {
    fn from(c: Container) -> Self {
        Document::Container(c)
    }
}

impl From<Number> for Document {
    fn from(n: Number) -> Self {
        Document::Scalar(n.into())
    }
}

impl From<i64> for Document {
    fn from(i: i64) -> Self {
        Document::Scalar(Scalar::Int(i))
    }
}

impl From<i32> for Document {
    fn from(i: i32) -> Self {
        Document::Scalar(Scalar::Int(i as i64))
    }
}

impl From<f64> for Document {
    fn from(f: f64) -> Self {
        Document::Scalar(Scalar::Float(f))
    }
}

impl From<bool> for Document {
    fn from(b: bool) -> Self {
        Document::Scalar(Scalar::Bool(b))
    }
}

impl From<&str> for Document {
    fn from(s: &str) -> Self {
        Document::Scalar(Scalar::String(s.to_string()))
    }
}

impl From<String> for Document {
    fn from(s: String) -> Self {
        Document::Scalar(Scalar::String(s))
    }
}

impl From<Vec<Document>> for Document {
    fn from(items: Vec<Document>) -> Self {
        Document::Container(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Key::from(i), item))
                .collect(),
        )
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Document::from_value(&value)
    }
}

impl From<&Value> for Document {
    fn from(value: &Value) -> Self {
        Document::from_value(value)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.to_value()
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Document::Scalar(Scalar::Null) => serializer.serialize_unit(),
            Document::Scalar(Scalar::Bool(b)) => serializer.serialize_bool(*b),
            Document::Scalar(Scalar::Int(i)) => serializer.serialize_i64(*i),
            Document::Scalar(Scalar::Float(f)) => serializer.serialize_f64(*f),
            Document::Scalar(Scalar::String(s)) => serializer.serialize_str(s),
            Document::Container(c) if c.is_list() => {
                let mut seq = serializer.serialize_seq(Some(c.len()))?;
                for item in c.values() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Document::Container(c) => {
                let mut map = serializer.serialize_map(Some(c.len()))?;
                for (k, v) in c.iter() {
                    map.serialize_entry(&k.to_string(), v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Document::from_value(&value))
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}
