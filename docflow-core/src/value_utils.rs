//! Value utility functions shared across modules
//!
//! Ordering between document values (used by the comparison operators and by
//! the pipeline sort) and the compiled-regex cache used by the `regex`
//! operator and by wildcard path matching.

use crate::document::{Document, Number, Scalar};
use crate::error::{DocflowError, Result};
use lazy_static::lazy_static;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::cmp::Ordering;
use std::num::NonZeroUsize;

const REGEX_CACHE_SIZE: usize = 100;

lazy_static! {
    /// Compiled patterns keyed by "options:pattern"
    static ref REGEX_CACHE: Mutex<LruCache<String, Regex>> = Mutex::new(LruCache::new(
        NonZeroUsize::new(REGEX_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN)
    ));
}

/// Build regex pattern string with inline flags
///
/// Only `i`, `m`, `s` and `x` are honoured; other option characters are ignored.
fn build_regex_pattern(pattern: &str, options: &str) -> String {
    let valid_options: String = options
        .chars()
        .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
        .collect();

    if valid_options.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", valid_options, pattern)
    }
}

/// Get or compile a regex pattern with caching
pub fn cached_regex(pattern: &str, options: &str) -> Result<Regex> {
    let cache_key = format!("{}:{}", options, pattern);

    if let Some(regex) = REGEX_CACHE.lock().get(&cache_key) {
        return Ok(regex.clone());
    }

    let regex = Regex::new(&build_regex_pattern(pattern, options)).map_err(|e| {
        DocflowError::InvalidOperand(format!("invalid regex pattern '{}': {}", pattern, e))
    })?;

    REGEX_CACHE.lock().put(cache_key, regex.clone());
    Ok(regex)
}

fn compare_numbers(a: Number, b: Number) -> Option<Ordering> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => Some(x.cmp(&y)),
        (x, y) => x.as_f64().partial_cmp(&y.as_f64()),
    }
}

/// Compare two document values for the comparison operators
///
/// Returns `Some(Ordering)` for comparable scalars, `None` otherwise.
///
/// - Number vs Number: numeric (integers compared exactly)
/// - Number vs numeric String: numeric
/// - String vs String: lexicographic
/// - Bool vs Bool: false < true
///
/// # Examples
///
/// ```
/// use docflow_core::value_utils::compare_values;
/// use docflow_core::Document;
/// use std::cmp::Ordering;
///
/// assert_eq!(compare_values(&Document::from(10), &Document::from(5)), Some(Ordering::Greater));
/// assert_eq!(compare_values(&Document::from("a"), &Document::from("b")), Some(Ordering::Less));
/// assert_eq!(compare_values(&Document::from("a"), &Document::from(1)), None);
/// ```
pub fn compare_values(a: &Document, b: &Document) -> Option<Ordering> {
    let (a, b) = match (a, b) {
        (Document::Scalar(a), Document::Scalar(b)) => (a, b),
        _ => return None,
    };
    match (a, b) {
        (Scalar::String(s1), Scalar::String(s2)) => Some(s1.cmp(s2)),
        (Scalar::Bool(b1), Scalar::Bool(b2)) => Some(b1.cmp(b2)),
        (Scalar::Int(_) | Scalar::Float(_), _) | (_, Scalar::Int(_) | Scalar::Float(_)) => {
            compare_numbers(a.as_number()?, b.as_number()?)
        }
        _ => None,
    }
}

/// Sort rank of a value's type: missing < null < bool < number < string < container
fn sort_rank(value: Option<&Document>) -> u8 {
    match value {
        None => 0,
        Some(Document::Scalar(Scalar::Null)) => 1,
        Some(Document::Scalar(Scalar::Bool(_))) => 2,
        Some(Document::Scalar(Scalar::Int(_) | Scalar::Float(_))) => 3,
        Some(Document::Scalar(Scalar::String(_))) => 4,
        Some(Document::Container(_)) => 5,
    }
}

/// NaN sorts above every number
fn cmp_floats(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

/// Exact integer/float comparison, without rounding the integer to f64
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() || f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0f64.partial_cmp(&(f - whole)).unwrap_or(Ordering::Equal),
        ord => ord,
    }
}

/// Total order over optional values, used by the pipeline sort
///
/// Values are ranked by type first and only compared within a type, so a
/// numeric string never compares numerically here. Containers tie.
///
/// ```
/// use docflow_core::value_utils::compare_for_sort;
/// use docflow_core::Document;
/// use std::cmp::Ordering;
///
/// let nine = Document::from(9);
/// let ten = Document::from("10");
/// assert_eq!(compare_for_sort(Some(&nine), Some(&ten)), Ordering::Less);
/// assert_eq!(compare_for_sort(None, Some(&nine)), Ordering::Less);
/// ```
pub fn compare_for_sort(a: Option<&Document>, b: Option<&Document>) -> Ordering {
    let by_rank = sort_rank(a).cmp(&sort_rank(b));
    if by_rank != Ordering::Equal {
        return by_rank;
    }
    match (a, b) {
        (Some(Document::Scalar(x)), Some(Document::Scalar(y))) => match (x, y) {
            (Scalar::Bool(p), Scalar::Bool(q)) => p.cmp(q),
            (Scalar::Int(p), Scalar::Int(q)) => p.cmp(q),
            (Scalar::Float(p), Scalar::Float(q)) => cmp_floats(*p, *q),
            (Scalar::Int(p), Scalar::Float(q)) => cmp_int_float(*p, *q),
            (Scalar::Float(p), Scalar::Int(q)) => cmp_int_float(*q, *p).reverse(),
            (Scalar::String(p), Scalar::String(q)) => p.cmp(q),
            _ => Ordering::Equal,
        },
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d<T: Into<Document>>(v: T) -> Document {
        v.into()
    }

    #[test]
    fn test_compare_values_numbers() {
        assert_eq!(compare_values(&d(10), &d(5)), Some(Ordering::Greater));
        assert_eq!(compare_values(&d(5), &d(10)), Some(Ordering::Less));
        assert_eq!(compare_values(&d(5), &d(5.0)), Some(Ordering::Equal));
        assert_eq!(compare_values(&d(3.5), &d(2.5)), Some(Ordering::Greater));
    }

    #[test]
    fn test_compare_values_exact_large_integers() {
        let a = d(i64::MAX);
        let b = d(i64::MAX - 1);
        assert_eq!(compare_values(&a, &b), Some(Ordering::Greater));
    }

    #[test]
    fn test_compare_values_numeric_string() {
        assert_eq!(compare_values(&d("18"), &d(18)), Some(Ordering::Equal));
        assert_eq!(compare_values(&d(9), &d("10")), Some(Ordering::Less));
        assert_eq!(compare_values(&d("abc"), &d(1)), None);
    }

    #[test]
    fn test_compare_values_strings_and_bools() {
        assert_eq!(compare_values(&d("banana"), &d("apple")), Some(Ordering::Greater));
        // Two strings compare lexically even when both look numeric
        assert_eq!(compare_values(&d("10"), &d("9")), Some(Ordering::Less));
        assert_eq!(compare_values(&d(true), &d(false)), Some(Ordering::Greater));
    }

    #[test]
    fn test_compare_values_incompatible() {
        assert_eq!(compare_values(&d(true), &d(1)), None);
        assert_eq!(compare_values(&Document::new(), &d(1)), None);
        assert_eq!(compare_values(&Document::from(Scalar::Null), &d(1)), None);
    }

    #[test]
    fn test_compare_for_sort_ranks_types() {
        let ordered = [
            None,
            Some(Document::from(Scalar::Null)),
            Some(d(false)),
            Some(d(true)),
            Some(d(-3)),
            Some(d(2.5)),
            Some(d(9)),
            Some(d("10")),
            Some(d("9")),
            Some(d("a")),
            Some(Document::new()),
        ];
        for (i, a) in ordered.iter().enumerate() {
            for (j, b) in ordered.iter().enumerate() {
                assert_eq!(compare_for_sort(a.as_ref(), b.as_ref()), i.cmp(&j), "{} vs {}", i, j);
            }
        }
    }

    #[test]
    fn test_compare_for_sort_int_float_exact() {
        assert_eq!(compare_for_sort(Some(&d(2)), Some(&d(2.0))), Ordering::Equal);
        assert_eq!(compare_for_sort(Some(&d(2)), Some(&d(2.5))), Ordering::Less);
        assert_eq!(compare_for_sort(Some(&d(-2)), Some(&d(-2.5))), Ordering::Greater);
        assert_eq!(
            compare_for_sort(Some(&d(i64::MAX)), Some(&d(9_223_372_036_854_775_807.0))),
            Ordering::Less
        );
        assert_eq!(compare_for_sort(Some(&d(f64::NAN)), Some(&d(i64::MAX))), Ordering::Greater);
        assert_eq!(compare_for_sort(Some(&d(-0.0)), Some(&d(0))), Ordering::Equal);
    }

    #[test]
    fn test_cached_regex_options() {
        let re = cached_regex("^alice$", "i").unwrap();
        assert!(re.is_match("ALICE"));
        let strict = cached_regex("^alice$", "").unwrap();
        assert!(!strict.is_match("ALICE"));
        // Unknown option characters are dropped
        assert!(cached_regex("^a", "qz").unwrap().is_match("a"));
    }

    #[test]
    fn test_cached_regex_invalid_pattern() {
        let err = cached_regex("(unclosed", "").unwrap_err();
        assert!(matches!(err, DocflowError::InvalidOperand(_)));
    }
}
