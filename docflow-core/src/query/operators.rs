// src/query/operators.rs
//! Comparison operator table shared by `where` and `match` predicates
//!
//! Each operator is a separate type implementing [`OperatorMatcher`]; the
//! symbol-to-operator mapping lives in [`OPERATOR_REGISTRY`].
//!
//! | symbol  | matches when                                   | operands |
//! |---------|------------------------------------------------|----------|
//! | `=`     | `v` strictly equals `a`                        | 1        |
//! | `!=`    | `v` does not strictly equal `a`                | 1        |
//! | `>` `>=` `<` `<=` | numeric / lexical comparison         | 1        |
//! | `<>`    | `b < v < a`                                    | 2        |
//! | `<=>`   | `b <= v <= a`                                  | 2        |
//! | `in`    | `v` is an element of list `a`                  | 1        |
//! | `!in`   | `v` is not an element of list `a`              | 1        |
//! | `type`  | type name of `v` equals `a`                    | 1        |
//! | `%`     | `v % a == b`                                   | 2        |
//! | `size`  | container `v` has `a` entries                  | 1        |
//! | `exist` | truthiness of `v` equals truthiness of `a`     | 1        |
//! | `regex` | `v` matches pattern `a` (options `b`, default `i`) | 1-2  |
//! | `match` | some item of list `a` is in container `v`      | 1        |
//! | `all`   | every item of list `a` is in container `v`     | 1        |

use crate::document::{Document, Number};
use crate::error::{DocflowError, Result};
use crate::value_utils::{cached_regex, compare_values};
use lazy_static::lazy_static;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Default flags for the `regex` operator when no options operand is given
const DEFAULT_REGEX_OPTIONS: &str = "i";

// ============================================================================
// TRAIT DEFINITION
// ============================================================================

/// Trait for all predicate operators
///
/// `value` is the row's field value (a missing field never reaches the
/// operator), `a` and `b` are the resolved operands.
pub trait OperatorMatcher: Send + Sync {
    /// Operator symbol (e.g. "=", "<=>", "regex")
    fn name(&self) -> &'static str;

    /// Minimum number of operands
    fn min_operands(&self) -> usize {
        1
    }

    /// Maximum number of operands
    fn max_operands(&self) -> usize {
        1
    }

    /// Check literal operands once, when a `where` predicate is registered
    fn validate(&self, _a: &Document, _b: Option<&Document>) -> Result<()> {
        Ok(())
    }

    fn matches(&self, value: &Document, a: &Document, b: Option<&Document>) -> Result<bool>;
}

/// Look up an operator by symbol
pub fn lookup(symbol: &str) -> Result<&'static dyn OperatorMatcher> {
    OPERATOR_REGISTRY
        .get(symbol)
        .map(|op| op.as_ref())
        .ok_or_else(|| DocflowError::UnknownOperator(symbol.to_string()))
}

fn second_operand<'a>(name: &str, b: Option<&'a Document>) -> Result<&'a Document> {
    b.ok_or_else(|| {
        DocflowError::InvalidOperand(format!("'{}' requires a second operand", name))
    })
}

fn require_list(name: &str, operand: &Document) -> Result<()> {
    if operand.is_container() {
        Ok(())
    } else {
        Err(DocflowError::InvalidOperand(format!(
            "'{}' requires a list operand, got {}",
            name,
            operand.type_name()
        )))
    }
}

fn require_number(name: &str, operand: &Document) -> Result<Number> {
    operand.as_number().ok_or_else(|| {
        DocflowError::InvalidOperand(format!(
            "'{}' requires a numeric operand, got {}",
            name,
            operand.type_name()
        ))
    })
}

/// Items of `haystack`, or the value itself when it is a scalar
fn members(haystack: &Document) -> Vec<&Document> {
    match haystack {
        Document::Container(c) => c.values().collect(),
        scalar => vec![scalar],
    }
}

// ============================================================================
// COMPARISON OPERATORS
// ============================================================================

pub struct EqOperator;

impl OperatorMatcher for EqOperator {
    fn name(&self) -> &'static str {
        "="
    }

    fn matches(&self, value: &Document, a: &Document, _b: Option<&Document>) -> Result<bool> {
        Ok(value == a)
    }
}

pub struct NeOperator;

impl OperatorMatcher for NeOperator {
    fn name(&self) -> &'static str {
        "!="
    }

    fn matches(&self, value: &Document, a: &Document, _b: Option<&Document>) -> Result<bool> {
        Ok(value != a)
    }
}

/// `>`, `>=`, `<`, `<=` share one implementation
pub struct OrderingOperator {
    symbol: &'static str,
    accept: fn(Ordering) -> bool,
}

impl OperatorMatcher for OrderingOperator {
    fn name(&self) -> &'static str {
        self.symbol
    }

    fn matches(&self, value: &Document, a: &Document, _b: Option<&Document>) -> Result<bool> {
        Ok(compare_values(value, a).map(self.accept).unwrap_or(false))
    }
}

/// `<>` (exclusive) and `<=>` (inclusive): `a` is the upper bound, `b` the lower
pub struct RangeOperator {
    symbol: &'static str,
    inclusive: bool,
}

impl OperatorMatcher for RangeOperator {
    fn name(&self) -> &'static str {
        self.symbol
    }

    fn min_operands(&self) -> usize {
        2
    }

    fn max_operands(&self) -> usize {
        2
    }

    fn validate(&self, _a: &Document, b: Option<&Document>) -> Result<()> {
        second_operand(self.symbol, b).map(|_| ())
    }

    fn matches(&self, value: &Document, a: &Document, b: Option<&Document>) -> Result<bool> {
        let lower = second_operand(self.symbol, b)?;
        let above = compare_values(value, lower);
        let below = compare_values(value, a);
        Ok(match (above, below) {
            (Some(lo), Some(hi)) if self.inclusive => lo != Ordering::Less && hi != Ordering::Greater,
            (Some(lo), Some(hi)) => lo == Ordering::Greater && hi == Ordering::Less,
            _ => false,
        })
    }
}

// ============================================================================
// MEMBERSHIP OPERATORS
// ============================================================================

pub struct InOperator;

impl OperatorMatcher for InOperator {
    fn name(&self) -> &'static str {
        "in"
    }

    fn validate(&self, a: &Document, _b: Option<&Document>) -> Result<()> {
        require_list(self.name(), a)
    }

    fn matches(&self, value: &Document, a: &Document, _b: Option<&Document>) -> Result<bool> {
        Ok(match a {
            Document::Container(list) => list.values().any(|item| item == value),
            Document::Scalar(_) => false,
        })
    }
}

pub struct NotInOperator;

impl OperatorMatcher for NotInOperator {
    fn name(&self) -> &'static str {
        "!in"
    }

    fn validate(&self, a: &Document, _b: Option<&Document>) -> Result<()> {
        require_list(self.name(), a)
    }

    fn matches(&self, value: &Document, a: &Document, _b: Option<&Document>) -> Result<bool> {
        Ok(match a {
            Document::Container(list) => !list.values().any(|item| item == value),
            Document::Scalar(_) => false,
        })
    }
}

/// Some item of list `a` is present in the field's container
pub struct MatchAnyOperator;

impl OperatorMatcher for MatchAnyOperator {
    fn name(&self) -> &'static str {
        "match"
    }

    fn validate(&self, a: &Document, _b: Option<&Document>) -> Result<()> {
        require_list(self.name(), a)
    }

    fn matches(&self, value: &Document, a: &Document, _b: Option<&Document>) -> Result<bool> {
        let present = members(value);
        Ok(members(a).iter().any(|wanted| present.contains(wanted)))
    }
}

/// Every item of list `a` is present in the field's container
pub struct AllOperator;

impl OperatorMatcher for AllOperator {
    fn name(&self) -> &'static str {
        "all"
    }

    fn validate(&self, a: &Document, _b: Option<&Document>) -> Result<()> {
        require_list(self.name(), a)
    }

    fn matches(&self, value: &Document, a: &Document, _b: Option<&Document>) -> Result<bool> {
        let present = members(value);
        Ok(members(a).iter().all(|wanted| present.contains(wanted)))
    }
}

// ============================================================================
// ELEMENT OPERATORS
// ============================================================================

pub struct TypeOperator;

fn canonical_type_name(name: &str) -> &str {
    match name {
        "boolean" => "bool",
        "integer" | "long" => "int",
        "double" | "number" => "float",
        "list" | "object" | "map" => "array",
        other => other,
    }
}

impl OperatorMatcher for TypeOperator {
    fn name(&self) -> &'static str {
        "type"
    }

    fn validate(&self, a: &Document, _b: Option<&Document>) -> Result<()> {
        match a.as_str() {
            Some(_) => Ok(()),
            None => Err(DocflowError::InvalidOperand(
                "'type' requires a type name".to_string(),
            )),
        }
    }

    fn matches(&self, value: &Document, a: &Document, _b: Option<&Document>) -> Result<bool> {
        Ok(match a.as_str() {
            Some(name) => value.type_name() == canonical_type_name(&name.to_lowercase()),
            None => false,
        })
    }
}

/// `v % a == b`
pub struct ModOperator;

impl OperatorMatcher for ModOperator {
    fn name(&self) -> &'static str {
        "%"
    }

    fn min_operands(&self) -> usize {
        2
    }

    fn max_operands(&self) -> usize {
        2
    }

    fn validate(&self, a: &Document, b: Option<&Document>) -> Result<()> {
        let divisor = require_number(self.name(), a)?;
        if divisor.as_f64() == 0.0 {
            return Err(DocflowError::InvalidOperand("'%' by zero".to_string()));
        }
        require_number(self.name(), second_operand(self.name(), b)?).map(|_| ())
    }

    fn matches(&self, value: &Document, a: &Document, b: Option<&Document>) -> Result<bool> {
        let remainder = second_operand(self.name(), b)?;
        let (v, divisor, expected) = match (value.as_number(), a.as_number(), remainder.as_number()) {
            (Some(v), Some(d), Some(r)) => (v, d, r),
            _ => return Ok(false),
        };
        let actual = match (v, divisor) {
            (Number::Int(x), Number::Int(y)) => match x.checked_rem(y) {
                Some(r) => Number::Int(r),
                None => return Ok(false),
            },
            (x, y) if y.as_f64() != 0.0 => Number::Float(x.as_f64() % y.as_f64()),
            _ => return Ok(false),
        };
        Ok(compare_values(&Document::from(actual), &Document::from(expected)) == Some(Ordering::Equal))
    }
}

pub struct SizeOperator;

impl OperatorMatcher for SizeOperator {
    fn name(&self) -> &'static str {
        "size"
    }

    fn validate(&self, a: &Document, _b: Option<&Document>) -> Result<()> {
        require_number(self.name(), a).map(|_| ())
    }

    fn matches(&self, value: &Document, a: &Document, _b: Option<&Document>) -> Result<bool> {
        Ok(match (value, a.as_number()) {
            (Document::Container(c), Some(size)) => c.len() as f64 == size.as_f64(),
            _ => false,
        })
    }
}

pub struct ExistOperator;

impl OperatorMatcher for ExistOperator {
    fn name(&self) -> &'static str {
        "exist"
    }

    fn matches(&self, value: &Document, a: &Document, _b: Option<&Document>) -> Result<bool> {
        Ok(value.is_truthy() == a.is_truthy())
    }
}

// ============================================================================
// PATTERN OPERATORS
// ============================================================================

/// Regex match against the field's text form; case-insensitive unless an
/// options operand says otherwise
pub struct RegexOperator;

impl RegexOperator {
    fn options<'a>(b: Option<&'a Document>) -> &'a str {
        b.and_then(Document::as_str).unwrap_or(DEFAULT_REGEX_OPTIONS)
    }
}

impl OperatorMatcher for RegexOperator {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn max_operands(&self) -> usize {
        2
    }

    fn validate(&self, a: &Document, b: Option<&Document>) -> Result<()> {
        let pattern = a.as_str().ok_or_else(|| {
            DocflowError::InvalidOperand("'regex' requires a string pattern".to_string())
        })?;
        cached_regex(pattern, Self::options(b)).map(|_| ())
    }

    fn matches(&self, value: &Document, a: &Document, b: Option<&Document>) -> Result<bool> {
        let (text, pattern) = match (value.as_scalar(), a.as_str()) {
            (Some(s), Some(p)) if !s.is_null() => (s.to_text(), p),
            _ => return Ok(false),
        };
        let regex = cached_regex(pattern, Self::options(b))?;
        Ok(regex.is_match(&text))
    }
}

// ============================================================================
// OPERATOR REGISTRY
// ============================================================================

lazy_static! {
    /// Global registry of all predicate operators, keyed by symbol
    pub static ref OPERATOR_REGISTRY: HashMap<&'static str, Box<dyn OperatorMatcher>> = {
        let mut registry: HashMap<&'static str, Box<dyn OperatorMatcher>> = HashMap::new();

        // Comparison operators
        registry.insert("=", Box::new(EqOperator));
        registry.insert("!=", Box::new(NeOperator));
        registry.insert(">", Box::new(OrderingOperator { symbol: ">", accept: |o| o == Ordering::Greater }));
        registry.insert(">=", Box::new(OrderingOperator { symbol: ">=", accept: |o| o != Ordering::Less }));
        registry.insert("<", Box::new(OrderingOperator { symbol: "<", accept: |o| o == Ordering::Less }));
        registry.insert("<=", Box::new(OrderingOperator { symbol: "<=", accept: |o| o != Ordering::Greater }));
        registry.insert("<>", Box::new(RangeOperator { symbol: "<>", inclusive: false }));
        registry.insert("<=>", Box::new(RangeOperator { symbol: "<=>", inclusive: true }));

        // Membership operators
        registry.insert("in", Box::new(InOperator));
        registry.insert("!in", Box::new(NotInOperator));
        registry.insert("match", Box::new(MatchAnyOperator));
        registry.insert("all", Box::new(AllOperator));

        // Element operators
        registry.insert("type", Box::new(TypeOperator));
        registry.insert("%", Box::new(ModOperator));
        registry.insert("size", Box::new(SizeOperator));
        registry.insert("exist", Box::new(ExistOperator));

        // Pattern operators
        registry.insert("regex", Box::new(RegexOperator));

        registry
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(value: serde_json::Value) -> Document {
        Document::from_value(&value)
    }

    fn check(symbol: &str, value: serde_json::Value, a: serde_json::Value) -> bool {
        lookup(symbol).unwrap().matches(&d(value), &d(a), None).unwrap()
    }

    fn check2(symbol: &str, value: serde_json::Value, a: serde_json::Value, b: serde_json::Value) -> bool {
        lookup(symbol)
            .unwrap()
            .matches(&d(value), &d(a), Some(&d(b)))
            .unwrap()
    }

    #[test]
    fn test_registry_contents() {
        assert_eq!(OPERATOR_REGISTRY.len(), 17);
        for (symbol, op) in OPERATOR_REGISTRY.iter() {
            assert_eq!(*symbol, op.name());
        }
    }

    #[test]
    fn test_unknown_operator() {
        let err = lookup("~=").err().unwrap();
        assert!(matches!(err, DocflowError::UnknownOperator(ref s) if s == "~="));
    }

    #[test]
    fn test_strict_equality() {
        assert!(check("=", json!(1), json!(1)));
        assert!(!check("=", json!(1), json!(1.0)));
        assert!(!check("=", json!("1"), json!(1)));
        assert!(check("!=", json!("1"), json!(1)));
        assert!(check("=", json!({"a": [1]}), json!({"a": [1]})));
    }

    #[test]
    fn test_ordering_operators() {
        assert!(check(">=", json!(18), json!(18)));
        assert!(!check(">=", json!(17), json!(18)));
        assert!(check(">", json!("b"), json!("a")));
        assert!(check("<", json!(1.5), json!(2)));
        assert!(check("<=", json!(2), json!(2.0)));
        // Incompatible types never match
        assert!(!check("<", json!("x"), json!(5)));
        assert!(!check(">", json!([1]), json!(0)));
    }

    #[test]
    fn test_range_operators() {
        assert!(check2("<>", json!(5), json!(10), json!(1)));
        assert!(!check2("<>", json!(10), json!(10), json!(1)));
        assert!(!check2("<>", json!(1), json!(10), json!(1)));
        assert!(check2("<=>", json!(10), json!(10), json!(1)));
        assert!(check2("<=>", json!(1), json!(10), json!(1)));
        assert!(!check2("<=>", json!(11), json!(10), json!(1)));
    }

    #[test]
    fn test_range_requires_second_operand() {
        let op = lookup("<>").unwrap();
        assert!(op.validate(&d(json!(10)), None).is_err());
        assert_eq!(op.min_operands(), 2);
    }

    #[test]
    fn test_in_and_not_in() {
        assert!(check("in", json!("b"), json!(["a", "b"])));
        assert!(!check("in", json!("c"), json!(["a", "b"])));
        assert!(check("!in", json!("c"), json!(["a", "b"])));
        assert!(!check("!in", json!("a"), json!(["a", "b"])));
        assert!(lookup("in").unwrap().validate(&d(json!("a")), None).is_err());
    }

    #[test]
    fn test_type_operator() {
        assert!(check("type", json!(1), json!("int")));
        assert!(check("type", json!(1), json!("integer")));
        assert!(check("type", json!(1.5), json!("float")));
        assert!(check("type", json!("s"), json!("string")));
        assert!(check("type", json!([1]), json!("array")));
        assert!(check("type", json!(true), json!("Boolean")));
        assert!(!check("type", json!(1), json!("string")));
    }

    #[test]
    fn test_mod_operator() {
        assert!(check2("%", json!(10), json!(3), json!(1)));
        assert!(!check2("%", json!(9), json!(3), json!(1)));
        assert!(check2("%", json!(7.5), json!(2), json!(1.5)));
        assert!(lookup("%").unwrap().validate(&d(json!(0)), Some(&d(json!(0)))).is_err());
    }

    #[test]
    fn test_size_operator() {
        assert!(check("size", json!([1, 2, 3]), json!(3)));
        assert!(!check("size", json!([1, 2]), json!(3)));
        assert!(!check("size", json!("abc"), json!(3)));
    }

    #[test]
    fn test_exist_operator() {
        assert!(check("exist", json!("x"), json!(true)));
        assert!(!check("exist", json!(""), json!(true)));
        assert!(check("exist", json!(0), json!(false)));
    }

    #[test]
    fn test_regex_case_insensitive_by_default() {
        assert!(check("regex", json!("Alice"), json!("^ali")));
        assert!(!check2("regex", json!("Alice"), json!("^ali"), json!("")));
        assert!(check("regex", json!(12345), json!("^123")));
        assert!(!check("regex", json!(null), json!(".*")));
        assert!(lookup("regex").unwrap().validate(&d(json!("(")), None).is_err());
    }

    #[test]
    fn test_match_and_all() {
        assert!(check("match", json!(["rust", "go"]), json!(["java", "go"])));
        assert!(!check("match", json!(["rust"]), json!(["java", "go"])));
        assert!(check("all", json!(["rust", "go", "c"]), json!(["go", "rust"])));
        assert!(!check("all", json!(["rust"]), json!(["go", "rust"])));
        assert!(check("match", json!("go"), json!(["java", "go"])));
    }
}
