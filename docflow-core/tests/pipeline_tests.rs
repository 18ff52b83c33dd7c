// pipeline_tests.rs
// End-to-end aggregation scenarios: orders feed, JSON specs, lazy sources

use docflow_core::{Collect, DocflowError, Document, Key, SortDirection};
use serde_json::{json, Value};
use std::cell::Cell;

/// Helper to turn a JSON array into pipeline rows
fn rows(value: Value) -> Vec<Document> {
    value
        .as_array()
        .map(|items| items.iter().map(Document::from_value).collect())
        .unwrap_or_default()
}

fn orders() -> Vec<Document> {
    rows(json!([
        {"id": 1, "customer": {"name": "alice", "tier": "gold"}, "status": "paid",
         "lines": [{"sku": "A1", "qty": 2, "price": 10.0}, {"sku": "B2", "qty": 1, "price": 4.5}]},
        {"id": 2, "customer": {"name": "bob", "tier": "silver"}, "status": "open",
         "lines": [{"sku": "A1", "qty": 5, "price": 10.0}]},
        {"id": 3, "customer": {"name": "carol", "tier": "gold"}, "status": "paid",
         "lines": [{"sku": "C3", "qty": 1, "price": 99.0}]},
        {"id": 4, "customer": {"name": "dave", "tier": "gold"}, "status": "cancelled",
         "lines": []}
    ]))
}

// ========== SPEC SCENARIOS ==========

#[test]
fn test_group_sum_scenario() {
    let out = Collect::new()
        .group("cat")
        .sum("amt", "total", Some("cat"))
        .values(rows(json!([
            {"cat": "A", "amt": 10},
            {"cat": "A", "amt": 5},
            {"cat": "B", "amt": 7}
        ])))
        .unwrap();
    assert_eq!(
        out.to_value(),
        json!({"A": {"sum": {"total": 15}}, "B": {"sum": {"total": 7}}})
    );
}

#[test]
fn test_where_scenario() {
    let collect = Collect::new().where_("age", ">=", 18).unwrap();
    assert_eq!(collect.values(rows(json!([{"age": 17}]))).unwrap().len(), 0);
    assert_eq!(collect.values(rows(json!([{"age": 18}]))).unwrap().len(), 1);
}

// ========== ORDERS FEED ==========

#[test]
fn test_paid_lines_per_sku() {
    let out = Collect::new()
        .unwind("lines")
        .where_("status", "=", "paid")
        .unwrap()
        .group("lines.sku")
        .sum("lines.qty", "units", Some("lines.sku"))
        .values(orders())
        .unwrap();
    assert_eq!(
        out.to_value(),
        json!({
            "A1": {"sum": {"units": 2}},
            "B2": {"sum": {"units": 1}},
            "C3": {"sum": {"units": 1}}
        })
    );
}

#[test]
fn test_tier_then_status_buckets() {
    let out = Collect::new()
        .with("id")
        .with("customer.tier")
        .with("status")
        .group("customer.tier")
        .group("status")
        .values(orders())
        .unwrap();
    assert_eq!(out.get("gold.paid").map(Document::len), Some(2));
    assert_eq!(out.get("gold.cancelled.0.id"), Some(&Document::from(4)));
    assert_eq!(
        out.get("silver.open.0").map(Document::to_value),
        Some(json!({"id": 2, "customer": {"tier": "silver"}, "status": "open"}))
    );
}

#[test]
fn test_line_counts_with_ungrouped_sum() {
    let out = Collect::new()
        .sum("lines", "line_count", None)
        .sum("id", "id_total", None)
        .values(orders())
        .unwrap();
    assert_eq!(out.to_value(), json!({"line_count": 4, "id_total": 10}));
}

#[test]
fn test_projection_and_sort() {
    let out = Collect::new()
        .without("lines")
        .where_with("customer.name", "regex", "^[a-c]", "")
        .unwrap()
        .sort("customer.tier", SortDirection::Ascending)
        .sort("id", SortDirection::Descending)
        .values(orders())
        .unwrap();
    let ids: Vec<i64> = out.iter().filter_map(|(_, r)| r.get("id")?.as_i64()).collect();
    assert_eq!(ids, vec![3, 1, 2]);
    assert!(out.get("0.lines").is_none());
}

#[test]
fn test_regex_default_is_case_insensitive() {
    let out = Collect::new()
        .where_("customer.name", "regex", "^ALICE$")
        .unwrap()
        .values(orders())
        .unwrap();
    assert_eq!(out.len(), 1);
}

#[test]
fn test_size_and_type_operators() {
    let out = Collect::new()
        .where_("lines", "size", 1)
        .unwrap()
        .where_("id", "type", "int")
        .unwrap()
        .values(orders())
        .unwrap();
    let ids: Vec<i64> = out.iter().filter_map(|(_, r)| r.get("id")?.as_i64()).collect();
    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn test_filter_closures_run_after_projection() {
    let out = Collect::new()
        .with("customer")
        .filter_recursive(|key, value| match key {
            Key::Name(k) if k == "tier" => None,
            _ => Some(value),
        })
        .filter(|_, value| Some(value))
        .values(orders())
        .unwrap();
    assert_eq!(out.get("0").map(Document::to_value), Some(json!({"customer": {"name": "alice"}})));
}

// ========== JSON SPEC ==========

#[test]
fn test_json_spec_pipeline() {
    let spec = json!({
        "unwind": ["lines"],
        "without": ["customer"],
        "where": [["lines.price", "<=>", 50, 5]],
        "sort": [["lines.price", "desc"], ["id"]]
    });
    let out = Collect::from_json(&spec).unwrap().values(orders()).unwrap();
    let picked: Vec<(i64, String)> = out
        .iter()
        .filter_map(|(_, r)| Some((r.get("id")?.as_i64()?, r.get("lines.sku")?.as_str()?.to_string())))
        .collect();
    assert_eq!(picked, vec![(1, "A1".to_string()), (2, "A1".to_string())]);
}

#[test]
fn test_json_spec_unknown_operator() {
    let err = Collect::from_json(&json!({"where": [["a", "~", 1]]})).unwrap_err();
    assert!(matches!(err, DocflowError::UnknownOperator(_)));
}

#[test]
fn test_json_spec_sort_with_group_rejected() {
    let collect = Collect::from_json(&json!({"group": ["status"], "sort": [["id"]]})).unwrap();
    let err = collect.values(orders()).unwrap_err();
    assert!(matches!(err, DocflowError::InvalidPipeline(_)));
}

// ========== SOURCE TESTS ==========

#[test]
fn test_iterator_source() {
    let pulled = Cell::new(0);
    let source = (0..5).map(|i| {
        pulled.set(pulled.get() + 1);
        Document::from(json!({"n": i}))
    });
    let collect = Collect::new().where_with("n", "%", 2, 0).unwrap();
    let result = collect.values(source).unwrap();
    assert_eq!(pulled.get(), 5);
    assert_eq!(result.to_value(), json!([{"n": 0}, {"n": 2}, {"n": 4}]));
}

#[test]
fn test_failing_source_stops_pulling() {
    let lines = [
        r#"{"n": 0}"#,
        r#"{"n": 1}"#,
        r#"{"n": 2}"#,
        r#"{"n": "#,
        r#"{"n": 4}"#,
        r#"{"n": 5}"#,
    ];
    let pulled = Cell::new(0);
    let source = lines.iter().map(|line| {
        pulled.set(pulled.get() + 1);
        Document::from_json(line)
    });
    let err = Collect::new().try_values(source).unwrap_err();
    assert!(matches!(err, DocflowError::Serialization(_)));
    assert_eq!(pulled.get(), 4);
}

#[test]
fn test_modulo_needs_two_operands() {
    let err = Collect::new().where_("n", "%", 2).unwrap_err();
    assert!(matches!(err, DocflowError::InvalidOperand(_)));
}

#[test]
fn test_structural_error_aborts_evaluation() {
    // Outer accumulator "sum" is a scalar where the inner bucket needs a container
    let err = Collect::new()
        .group("a")
        .group("b")
        .sum("n", "sum", Some("a"))
        .sum("n", "total", Some("b"))
        .values(rows(json!([{"a": "x", "b": "sum", "n": 1}])))
        .unwrap_err();
    assert!(matches!(err, DocflowError::Structural(_)));
}

#[test]
fn test_empty_source() {
    assert_eq!(Collect::new().values(Vec::new()).unwrap().to_value(), json!([]));
    assert_eq!(
        Collect::new().group("x").values(Vec::new()).unwrap().to_value(),
        json!([])
    );
}
