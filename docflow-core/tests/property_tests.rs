// property_tests.rs
// Property-based tests for path addressing, pipeline ordering and hydration

use docflow_core::value_utils::compare_for_sort;
use docflow_core::{Collect, Document, Hydrator, Number, SortDirection};
use proptest::prelude::*;
use serde_json::json;
use std::cmp::Ordering;

fn arb_segment() -> impl Strategy<Value = String> {
    prop_oneof!["[a-z]{1,6}", (0u8..4).prop_map(|i| i.to_string())]
}

fn arb_path() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_segment(), 1..4).prop_map(|segments| segments.join("."))
}

fn arb_scalar() -> impl Strategy<Value = Document> {
    prop_oneof![
        any::<i64>().prop_map(Document::from),
        any::<bool>().prop_map(Document::from),
        "[a-z ]{0,8}".prop_map(Document::from),
        (-1.0e6f64..1.0e6).prop_map(Document::from),
    ]
}

proptest! {
    #[test]
    fn prop_set_then_get_round_trips(path in arb_path(), value in arb_scalar()) {
        let mut d = Document::new();
        d.set(&path, value.clone()).unwrap();
        prop_assert_eq!(d.get(&path), Some(&value));
    }

    #[test]
    fn prop_increment_inverse(path in arb_path(), start in -1_000_000i64..1_000_000, k in -1_000_000i64..1_000_000) {
        let mut d = Document::new();
        d.set(&path, start).unwrap();
        let before = d.clone();
        d.increment(&path, k).unwrap();
        d.increment(&path, Number::Int(k).neg()).unwrap();
        prop_assert_eq!(d.get(&path), before.get(&path));
    }

    #[test]
    fn prop_add_to_set_grows_by_one(path in arb_path(), values in prop::collection::vec(arb_scalar(), 1..10)) {
        let mut d = Document::new();
        for (i, v) in values.into_iter().enumerate() {
            d.add_to_set(&path, v).unwrap();
            prop_assert_eq!(d.get(&path).map(Document::len), Some(i + 1));
        }
    }

    #[test]
    fn prop_unwind_cardinality(items in prop::collection::vec(arb_scalar(), 0..8), id in any::<i64>()) {
        let mut d = Document::new();
        d.set("id", id).unwrap();
        d.set("items", Document::from(items.clone())).unwrap();
        let rows = d.unwind("items").unwrap();
        prop_assert_eq!(rows.len(), items.len());
        for (row, item) in rows.iter().zip(items.iter()) {
            prop_assert_eq!(row.get("items"), Some(item));
        }
        prop_assert!(d.unwind("id").unwrap().is_empty());
    }

    #[test]
    fn prop_sort_is_stable(keys in prop::collection::vec(0i64..4, 0..30)) {
        let rows: Vec<Document> = keys
            .iter()
            .enumerate()
            .map(|(seq, k)| Document::from(json!({"k": k, "seq": seq})))
            .collect();
        let out = Collect::new().sort("k", SortDirection::Ascending).values(rows).unwrap();

        let pairs: Vec<(i64, i64)> = out
            .iter()
            .filter_map(|(_, r)| Some((r.get("k")?.as_i64()?, r.get("seq")?.as_i64()?)))
            .collect();
        prop_assert_eq!(pairs.len(), keys.len());
        for w in pairs.windows(2) {
            prop_assert!(w[0].0 < w[1].0 || (w[0].0 == w[1].0 && w[0].1 < w[1].1));
        }
    }

    #[test]
    fn prop_sort_orders_mixed_types(
        keys in prop::collection::vec(prop::option::of(prop_oneof![
            arb_scalar(),
            (0i64..20).prop_map(|n| Document::from(n.to_string())),
        ]), 0..40)
    ) {
        let rows: Vec<Document> = keys
            .iter()
            .map(|k| {
                let mut row = Document::new();
                if let Some(k) = k {
                    row.set("k", k.clone()).unwrap();
                }
                row.set("pad", 0).unwrap();
                row
            })
            .collect();
        let out = Collect::new().sort("k", SortDirection::Ascending).values(rows).unwrap();
        let sorted: Vec<Option<&Document>> = out.iter().map(|(_, r)| r.get("k")).collect();
        prop_assert_eq!(sorted.len(), keys.len());
        for w in sorted.windows(2) {
            prop_assert_ne!(compare_for_sort(w[0], w[1]), Ordering::Greater);
        }
    }

    #[test]
    fn prop_sort_rejected_with_grouping(field in "[a-z]{1,5}") {
        let grouped = Collect::new().group(&field).sort(&field, SortDirection::Descending);
        prop_assert!(grouped.values(Vec::new()).is_err());
        let summed = Collect::new().sum(&field, "t", None).sort(&field, SortDirection::Ascending);
        prop_assert!(summed.values(Vec::new()).is_err());
    }

    #[test]
    fn prop_hydration_identity_without_coercion(
        entries in prop::collection::vec(("[a-z]{1,6}", arb_scalar(), arb_scalar()), 0..8)
    ) {
        let mut reference = Document::new();
        let mut input = Document::new();
        for (key, witness, value) in entries {
            reference.set(&key, witness).unwrap();
            input.set(&key, value).unwrap();
        }
        let out = Hydrator::new().coerce(false).hydrate(&reference, &input);
        prop_assert_eq!(out, input);
    }
}
