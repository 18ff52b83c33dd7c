// src/aggregation.rs
// Aggregation pipeline implementation
//
// Every row runs through the configured stages in a fixed order:
//
//   unwind -> without -> with -> filter -> filter_recursive -> where -> match
//          -> group | sum | append
//
// A stage that leaves nothing drops the row. Grouped or summed output is
// accumulated in place; appended rows are buffered so the final sort can see
// all of them.

use crate::document::{Container, Document, Key, Number, Scalar};
use crate::error::{DocflowError, Result};
use crate::path::{self, display_path, parse_path};
use crate::query::Predicate;
use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Key under which a group bucket keeps its sum accumulators
const SUM_BUCKET: &str = "sum";

/// Row transform used by [`Collect::filter`] and [`Collect::filter_recursive`].
/// Returning `None` removes the entry.
pub type FilterFn = Arc<dyn Fn(&Key, Document) -> Option<Document> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl FromStr for SortDirection {
    type Err = DocflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" | "1" => Ok(SortDirection::Ascending),
            "desc" | "descending" | "-1" => Ok(SortDirection::Descending),
            _ => Err(DocflowError::pipeline(format!(
                "sort direction must be asc or desc, got '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SumSpec {
    field: String,
    output: String,
    group: Option<String>,
}

/// Configurable single-pass aggregation over a sequence of documents
///
/// ```
/// use docflow_core::{Collect, Document};
/// use serde_json::json;
///
/// let rows = vec![
///     Document::from(json!({"cat": "A", "amt": 10})),
///     Document::from(json!({"cat": "A", "amt": 5})),
///     Document::from(json!({"cat": "B", "amt": 7})),
/// ];
/// let out = Collect::new().group("cat").sum("amt", "total", Some("cat")).values(rows).unwrap();
/// assert_eq!(out.to_value(), json!({"A": {"sum": {"total": 15}}, "B": {"sum": {"total": 7}}}));
/// ```
#[derive(Clone, Default)]
pub struct Collect {
    unwind: Vec<String>,
    without: Vec<String>,
    with: Vec<String>,
    filters: Vec<FilterFn>,
    recursive_filters: Vec<FilterFn>,
    wheres: Vec<Predicate>,
    matches: Vec<Predicate>,
    groups: Vec<String>,
    sums: Vec<SumSpec>,
    sorts: Vec<(String, SortDirection)>,
}

impl fmt::Debug for Collect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collect")
            .field("unwind", &self.unwind)
            .field("without", &self.without)
            .field("with", &self.with)
            .field("filters", &self.filters.len())
            .field("recursive_filters", &self.recursive_filters.len())
            .field("wheres", &self.wheres)
            .field("matches", &self.matches)
            .field("groups", &self.groups)
            .field("sums", &self.sums)
            .field("sorts", &self.sorts)
            .finish()
    }
}

impl Collect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand each row into one row per element of the list at `path`.
    /// Several unwinds apply in registration order (cartesian product).
    pub fn unwind(mut self, path: &str) -> Self {
        self.unwind.push(path.to_string());
        self
    }

    /// Delete `path` from every row
    pub fn without(mut self, path: &str) -> Self {
        self.without.push(path.to_string());
        self
    }

    /// Keep only the listed paths
    pub fn with(mut self, path: &str) -> Self {
        self.with.push(path.to_string());
        self
    }

    /// Transform each top-level entry of a row
    pub fn filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Key, Document) -> Option<Document> + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(f));
        self
    }

    /// Transform every scalar leaf of a row, depth-first
    pub fn filter_recursive<F>(mut self, f: F) -> Self
    where
        F: Fn(&Key, Document) -> Option<Document> + Send + Sync + 'static,
    {
        self.recursive_filters.push(Arc::new(f));
        self
    }

    /// Keep rows whose `field` satisfies `op` against a literal
    pub fn where_(self, field: &str, op: &str, value: impl Into<Document>) -> Result<Self> {
        self.push_where(Predicate::literal(field, op, value.into(), None)?)
    }

    /// Two-operand form of [`Collect::where_`] for `<>`, `<=>`, `%` and regex options
    pub fn where_with(
        self,
        field: &str,
        op: &str,
        value: impl Into<Document>,
        value2: impl Into<Document>,
    ) -> Result<Self> {
        self.push_where(Predicate::literal(field, op, value.into(), Some(value2.into()))?)
    }

    fn push_where(mut self, predicate: Predicate) -> Result<Self> {
        self.wheres.push(predicate);
        Ok(self)
    }

    /// Keep rows whose `field` satisfies `op` against the row's own `ref_a`
    pub fn match_(mut self, field: &str, op: &str, ref_a: &str) -> Result<Self> {
        self.matches.push(Predicate::reference(field, op, ref_a, None)?);
        Ok(self)
    }

    /// Two-operand form of [`Collect::match_`]
    pub fn match_with(mut self, field: &str, op: &str, ref_a: &str, ref_b: &str) -> Result<Self> {
        self.matches
            .push(Predicate::reference(field, op, ref_a, Some(ref_b))?);
        Ok(self)
    }

    /// Append one grouping level
    pub fn group(mut self, path: &str) -> Self {
        self.groups.push(path.to_string());
        self
    }

    /// Register a sum accumulator; `group` names the grouping level it fires on,
    /// `None` sums over all rows into a flat `{output: total}` map.
    pub fn sum(mut self, field: &str, output: &str, group: Option<&str>) -> Self {
        self.sums.push(SumSpec {
            field: field.to_string(),
            output: output.to_string(),
            group: group.map(str::to_string),
        });
        self
    }

    /// Register a sort key; only valid without grouping and summation
    pub fn sort(mut self, path: &str, direction: SortDirection) -> Self {
        self.sorts.push((path.to_string(), direction));
        self
    }

    /// Build a pipeline from its JSON description
    ///
    /// ```json
    /// {"unwind": ["tags"], "where": [["age", ">=", 18]], "group": ["cat"],
    ///  "sum": [["amt", "total", "cat"]], "sort": [["name", "asc"]]}
    /// ```
    pub fn from_json(spec: &Value) -> Result<Self> {
        let spec: PipelineSpec = serde_json::from_value(spec.clone())
            .map_err(|e| DocflowError::pipeline(e.to_string()))?;
        spec.into_collect()
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Run the pipeline over `rows` and materialize the output
    pub fn values<I>(&self, rows: I) -> Result<Document>
    where
        I: IntoIterator<Item = Document>,
    {
        self.run(rows.into_iter().map(Ok))
    }

    /// Like [`Collect::values`] for fallible sources such as database cursors;
    /// the first source error aborts the evaluation.
    pub fn try_values<I, E>(&self, rows: I) -> Result<Document>
    where
        I: IntoIterator<Item = std::result::Result<Document, E>>,
        E: Into<DocflowError>,
    {
        self.run(rows.into_iter().map(|row| row.map_err(Into::into)))
    }

    fn run<I>(&self, rows: I) -> Result<Document>
    where
        I: Iterator<Item = Result<Document>>,
    {
        let plan = Plan::compile(self)?;
        log::debug!("collect: {:?}", self);

        let mut sink = Sink::new(&plan);
        let mut read = 0usize;
        let mut kept = 0usize;

        for row in rows {
            let row = row?;
            read += 1;
            let row = match row {
                Document::Container(c) => c,
                Document::Scalar(s) => {
                    log::trace!("collect: dropped scalar row ({})", s.type_name());
                    continue;
                }
            };
            for expanded in plan.expand(row)? {
                if let Some(survivor) = plan.project_and_filter(expanded)? {
                    sink.accept(&plan, survivor)?;
                    kept += 1;
                }
            }
        }

        log::debug!("collect: {} rows read, {} kept", read, kept);
        sink.finish(&plan)
    }
}

// ============================================================================
// COMPILED PLAN
// ============================================================================

#[derive(Debug)]
struct SumTarget {
    field: Vec<Key>,
    output: Key,
}

#[derive(Debug)]
struct GroupLevel {
    path: Vec<Key>,
    sums: Vec<SumTarget>,
}

#[derive(Debug)]
enum SinkKind {
    Group(Vec<GroupLevel>),
    Sum(Vec<SumTarget>),
    Append(Vec<(Vec<Key>, SortDirection)>),
}

/// Parsed paths and validated stage combination
struct Plan<'a> {
    collect: &'a Collect,
    unwind: Vec<Vec<Key>>,
    without: Vec<Vec<Key>>,
    with: Vec<Vec<Key>>,
    sink: SinkKind,
}

fn parse_all(paths: &[String]) -> Result<Vec<Vec<Key>>> {
    paths.iter().map(|p| parse_path(p)).collect()
}

fn reject(msg: String) -> DocflowError {
    log::warn!("collect: {}", msg);
    DocflowError::pipeline(msg)
}

impl<'a> Plan<'a> {
    fn compile(collect: &'a Collect) -> Result<Self> {
        let grouped = !collect.groups.is_empty();
        let summed = !collect.sums.is_empty();

        if !collect.sorts.is_empty() && (grouped || summed) {
            return Err(reject(
                "sort cannot be combined with group or sum: their output is not a row list"
                    .to_string(),
            ));
        }

        let sink = if grouped {
            let mut levels = Vec::with_capacity(collect.groups.len());
            for group in &collect.groups {
                levels.push(GroupLevel {
                    path: parse_path(group)?,
                    sums: Vec::new(),
                });
            }
            for sum in &collect.sums {
                let label = sum.group.as_deref().ok_or_else(|| {
                    reject(format!(
                        "sum '{}' has no group label but the pipeline is grouped",
                        sum.output
                    ))
                })?;
                let level = collect
                    .groups
                    .iter()
                    .position(|g| g == label)
                    .ok_or_else(|| {
                        reject(format!(
                            "sum '{}' names group '{}', which is not a group level",
                            sum.output, label
                        ))
                    })?;
                levels[level].sums.push(SumTarget {
                    field: parse_path(&sum.field)?,
                    output: Key::parse(&sum.output),
                });
            }
            SinkKind::Group(levels)
        } else if summed {
            let mut targets = Vec::with_capacity(collect.sums.len());
            for sum in &collect.sums {
                if let Some(label) = &sum.group {
                    return Err(reject(format!(
                        "sum '{}' names group '{}' but the pipeline has no groups",
                        sum.output, label
                    )));
                }
                targets.push(SumTarget {
                    field: parse_path(&sum.field)?,
                    output: Key::parse(&sum.output),
                });
            }
            SinkKind::Sum(targets)
        } else {
            let mut keys = Vec::with_capacity(collect.sorts.len());
            for (path, direction) in &collect.sorts {
                keys.push((parse_path(path)?, *direction));
            }
            SinkKind::Append(keys)
        };

        Ok(Plan {
            collect,
            unwind: parse_all(&collect.unwind)?,
            without: parse_all(&collect.without)?,
            with: parse_all(&collect.with)?,
            sink,
        })
    }

    /// Cartesian expansion over every unwind path, in registration order
    fn expand(&self, row: Container) -> Result<Vec<Container>> {
        let mut rows = vec![row];
        for segments in &self.unwind {
            let mut next = Vec::new();
            for row in &rows {
                next.extend(path::unwind_path(row, segments)?);
            }
            if next.is_empty() {
                log::trace!("collect: row dropped by unwind '{}'", display_path(segments));
                return Ok(next);
            }
            rows = next;
        }
        Ok(rows)
    }

    /// Projection, closure filters and predicates; `None` drops the row
    fn project_and_filter(&self, mut row: Container) -> Result<Option<Container>> {
        if !self.without.is_empty() {
            for segments in &self.without {
                path::unset_path(&mut row, segments);
            }
            if row.is_empty() {
                return Ok(dropped("without"));
            }
        }

        if !self.with.is_empty() {
            let mut projected = Container::new();
            for segments in &self.with {
                if let Some(value) = path::get_path(&row, segments) {
                    path::set_path(&mut projected, segments, value.clone())?;
                }
            }
            if projected.is_empty() {
                return Ok(dropped("with"));
            }
            row = projected;
        }

        for f in &self.collect.filters {
            row = row
                .into_iter()
                .filter_map(|(key, value)| f(&key, value).map(|v| (key, v)))
                .collect();
            if row.is_empty() {
                return Ok(dropped("filter"));
            }
        }

        for f in &self.collect.recursive_filters {
            row = filter_leaves(row, f.as_ref());
            if row.is_empty() {
                return Ok(dropped("filter_recursive"));
            }
        }

        let doc = Document::Container(row);
        for predicate in &self.collect.wheres {
            if !predicate.evaluate(&doc)? {
                return Ok(dropped("where"));
            }
        }
        for predicate in &self.collect.matches {
            if !predicate.evaluate(&doc)? {
                return Ok(dropped("match"));
            }
        }

        match doc {
            Document::Container(row) => Ok(Some(row)),
            Document::Scalar(_) => Ok(None),
        }
    }
}

fn dropped(stage: &str) -> Option<Container> {
    log::trace!("collect: row dropped by {}", stage);
    None
}

fn filter_leaves(
    container: Container,
    f: &(dyn Fn(&Key, Document) -> Option<Document> + Send + Sync),
) -> Container {
    container
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Document::Container(child) => Some(Document::Container(filter_leaves(child, f))),
                leaf => f(&key, leaf),
            };
            value.map(|v| (key, v))
        })
        .collect()
}

/// Sum contribution of a row: container size, numeric value, or nothing
fn contribution(row: &Container, field: &[Key]) -> Number {
    match path::get_path(row, field) {
        Some(Document::Container(c)) => Number::from(c.len()),
        Some(Document::Scalar(s)) => s.as_number().unwrap_or(Number::Int(0)),
        None => Number::Int(0),
    }
}

/// Bucket key for a group value; `None` for missing, null and non-scalar values
fn bucket_key(row: &Container, level: &GroupLevel) -> Option<Key> {
    match path::get_path(row, &level.path)? {
        Document::Scalar(Scalar::Null) | Document::Container(_) => None,
        Document::Scalar(s) => Some(Key::parse(&s.to_text())),
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

enum Sink {
    Tree(Container),
    Rows(Vec<Container>),
}

impl Sink {
    fn new(plan: &Plan<'_>) -> Self {
        match &plan.sink {
            SinkKind::Sum(targets) => {
                let mut totals = Container::new();
                for target in targets {
                    totals.insert(target.output.clone(), Document::from(0));
                }
                Sink::Tree(totals)
            }
            SinkKind::Group(_) => Sink::Tree(Container::new()),
            SinkKind::Append(_) => Sink::Rows(Vec::new()),
        }
    }

    fn accept(&mut self, plan: &Plan<'_>, row: Container) -> Result<()> {
        match (self, &plan.sink) {
            (Sink::Rows(rows), _) => rows.push(row),
            (Sink::Tree(totals), SinkKind::Sum(targets)) => {
                for target in targets {
                    let segments = std::slice::from_ref(&target.output);
                    path::increment_path(totals, segments, contribution(&row, &target.field))?;
                }
            }
            (Sink::Tree(tree), SinkKind::Group(levels)) => {
                // Resolve every level first so a late miss cannot leave partial sums behind
                let mut keys = Vec::with_capacity(levels.len());
                for level in levels {
                    match bucket_key(&row, level) {
                        Some(key) => keys.push(key),
                        None => {
                            log::trace!(
                                "collect: row dropped by group '{}'",
                                display_path(&level.path)
                            );
                            return Ok(());
                        }
                    }
                }

                let mut bucket = Vec::with_capacity(levels.len() + 2);
                let mut summing = false;
                for (level, key) in levels.iter().zip(keys) {
                    bucket.push(key);
                    for target in &level.sums {
                        summing = true;
                        let mut slot = bucket.clone();
                        slot.push(Key::Name(SUM_BUCKET.to_string()));
                        slot.push(target.output.clone());
                        path::increment_path(tree, &slot, contribution(&row, &target.field))?;
                    }
                }
                if !summing {
                    path::add_to_set_path(tree, &bucket, Document::Container(row))?;
                }
            }
            (Sink::Tree(_), SinkKind::Append(_)) => {}
        }
        Ok(())
    }

    fn finish(self, plan: &Plan<'_>) -> Result<Document> {
        match (self, &plan.sink) {
            (Sink::Rows(rows), SinkKind::Append(keys)) if !keys.is_empty() => {
                Ok(Document::from(sort_rows(rows, keys)))
            }
            (Sink::Rows(rows), _) => Ok(Document::from(
                rows.into_iter().map(Document::Container).collect::<Vec<_>>(),
            )),
            (Sink::Tree(tree), _) => Ok(Document::Container(tree)),
        }
    }
}

/// Stable multi-key sort: extract the key tuple of every row once, sort the
/// (tuple, row) pairs, then unpack the rows in their new order.
fn sort_rows(rows: Vec<Container>, keys: &[(Vec<Key>, SortDirection)]) -> Vec<Document> {
    let mut decorated: Vec<(Vec<Option<Document>>, Container)> = rows
        .into_iter()
        .map(|row| {
            let tuple = keys
                .iter()
                .map(|(segments, _)| path::get_path(&row, segments).cloned())
                .collect();
            (tuple, row)
        })
        .collect();

    decorated.sort_by(|(a, _), (b, _)| {
        for (i, (_, direction)) in keys.iter().enumerate() {
            let ord = crate::value_utils::compare_for_sort(a[i].as_ref(), b[i].as_ref());
            let ord = match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    decorated
        .into_iter()
        .map(|(_, row)| Document::Container(row))
        .collect()
}

// ============================================================================
// JSON PIPELINE SPEC
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PipelineSpec {
    unwind: Vec<String>,
    without: Vec<String>,
    with: Vec<String>,
    #[serde(rename = "where")]
    where_: Vec<Vec<Value>>,
    #[serde(rename = "match")]
    match_: Vec<Vec<String>>,
    group: Vec<String>,
    sum: Vec<Vec<String>>,
    sort: Vec<Vec<String>>,
}

impl PipelineSpec {
    fn into_collect(self) -> Result<Collect> {
        let mut collect = Collect::new();
        collect.unwind = self.unwind;
        collect.without = self.without;
        collect.with = self.with;
        collect.groups = self.group;

        for clause in self.where_ {
            let (field, op, value, value2) = match clause.as_slice() {
                [Value::String(f), Value::String(o), v] => (f, o, v, None),
                [Value::String(f), Value::String(o), v, v2] => (f, o, v, Some(v2)),
                _ => {
                    return Err(DocflowError::pipeline(format!(
                        "where clause must be [field, op, value, value2?], got {}",
                        Value::Array(clause.clone())
                    )))
                }
            };
            collect.wheres.push(Predicate::literal(
                field,
                op,
                Document::from_value(value),
                value2.map(Document::from_value),
            )?);
        }

        for clause in self.match_ {
            let predicate = match clause.as_slice() {
                [f, o, a] => Predicate::reference(f, o, a, None)?,
                [f, o, a, b] => Predicate::reference(f, o, a, Some(b.as_str()))?,
                _ => {
                    return Err(DocflowError::pipeline(
                        "match clause must be [field, op, refA, refB?]".to_string(),
                    ))
                }
            };
            collect.matches.push(predicate);
        }

        for clause in self.sum {
            let spec = match clause.as_slice() {
                [field, output] => SumSpec {
                    field: field.clone(),
                    output: output.clone(),
                    group: None,
                },
                [field, output, group] => SumSpec {
                    field: field.clone(),
                    output: output.clone(),
                    group: Some(group.clone()),
                },
                _ => {
                    return Err(DocflowError::pipeline(
                        "sum clause must be [field, output, group?]".to_string(),
                    ))
                }
            };
            collect.sums.push(spec);
        }

        for clause in self.sort {
            let key = match clause.as_slice() {
                [path] => (path.clone(), SortDirection::Ascending),
                [path, direction] => (path.clone(), direction.parse()?),
                _ => {
                    return Err(DocflowError::pipeline(
                        "sort clause must be [path, direction?]".to_string(),
                    ))
                }
            };
            collect.sorts.push(key);
        }

        Ok(collect)
    }
}
