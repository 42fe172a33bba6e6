use std::collections::BTreeSet;

use proptest::prelude::*;
use serde_json::json;

use stepform_core::{
    FieldSpec, FieldType, FormSpec, FormState, ItemKey, RepeatableError, RepeatableSpec,
    ValidationOutcome,
};

fn fixture(name: &str) -> &'static str {
    match name {
        "order_form" => include_str!("fixtures/order_form.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

fn order_form() -> FormSpec {
    serde_json::from_str(fixture("order_form")).expect("deserialize")
}

fn unbounded_list() -> FormSpec {
    FormSpec::new("list").with_repeatable(RepeatableSpec::new(
        "items",
        vec![
            FieldSpec::new("name", FieldType::String),
            FieldSpec::new("note", FieldType::String),
        ],
    ))
}

#[test]
fn bounded_group_stops_at_max() {
    let mut form = FormState::new(order_form());
    assert_eq!(form.item_keys("items").len(), 1);
    assert!(!form.can_remove("items"));

    form.append("items").unwrap();
    form.append("items").unwrap();
    assert_eq!(form.item_keys("items").len(), 3);
    assert!(!form.can_append("items"));

    assert_eq!(
        form.append("items"),
        Err(RepeatableError::AtMax("items".into()))
    );
    assert_eq!(form.item_keys("items").len(), 3);
}

#[test]
fn remove_below_min_is_rejected() {
    let mut form = FormState::new(order_form());
    let key = form.item_keys("items")[0];
    assert_eq!(
        form.remove("items", key),
        Err(RepeatableError::BelowMin("items".into()))
    );
    assert_eq!(form.item_keys("items"), &[key]);
}

#[test]
fn appended_items_use_default_item() {
    let mut form = FormState::new(order_form());
    let key = form.append("items").unwrap();
    assert_eq!(
        form.value(&format!("items[{}].kind", key)),
        Some(&json!("physical"))
    );
    assert_eq!(form.value(&format!("items[{}].qty", key)), Some(&json!(1)));
    assert!(form.is_visible(&format!("items[{}].weight", key)));
}

#[test]
fn removal_clears_every_map_under_the_item() {
    let mut form = FormState::new(order_form());
    let keep = form.item_keys("items")[0];
    let doomed = form.append("items").unwrap();
    let prefix = format!("items[{}].", doomed);

    form.set_value(&format!("{}name", prefix), json!("lamp"))
        .unwrap();
    form.set_touched(&format!("{}name", prefix));
    assert!(!form.validate());
    assert!(!form.field_errors(&format!("{}weight", prefix)).is_empty());
    let ticket = form
        .begin_async_validation(&format!("{}name", prefix))
        .unwrap();

    form.remove("items", doomed).unwrap();

    assert!(
        form.store()
            .all_addresses()
            .iter()
            .all(|address| !address.starts_with(&prefix))
    );
    assert!(form.flagged_addresses().all(|address| !address.starts_with(&prefix)));
    assert!(form.errors().keys().all(|address| !address.starts_with(&prefix)));
    assert!(!form.is_validating());
    assert!(!form.complete_validation(ticket, ValidationOutcome::valid()));
    assert_eq!(form.item_keys("items"), &[keep]);
}

#[test]
fn moving_items_keeps_their_values() {
    let mut form = FormState::new(unbounded_list());
    let keys: Vec<ItemKey> = (0..3).map(|_| form.append("items").unwrap()).collect();
    for (index, key) in keys.iter().enumerate() {
        form.set_value(&format!("items[{}].name", key), json!(format!("n{}", index)))
            .unwrap();
    }
    form.move_item("items", 2, 0).unwrap();
    assert_eq!(form.item_keys("items"), &[keys[2], keys[0], keys[1]]);
    assert_eq!(
        form.values()["items"],
        json!([
            { "name": "n2", "note": null },
            { "name": "n0", "note": null },
            { "name": "n1", "note": null }
        ])
    );
}

#[derive(Debug, Clone)]
enum Op {
    Append,
    Remove(usize),
    Move(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::Append),
        1 => (0usize..8).prop_map(Op::Remove),
        1 => (0usize..8, 0usize..8).prop_map(|(from, to)| Op::Move(from, to)),
    ]
}

proptest! {
    #[test]
    fn keys_stay_bound_to_their_items(ops in proptest::collection::vec(op(), 1..40)) {
        let mut form = FormState::new(unbounded_list());
        let mut issued: BTreeSet<ItemKey> = BTreeSet::new();
        let mut removed: Vec<ItemKey> = Vec::new();
        let mut last_next = form.registration("items").unwrap().next_key();

        for op in ops {
            match op {
                Op::Append => {
                    let key = form.append("items").unwrap();
                    prop_assert!(issued.insert(key), "key {} reissued", key);
                    form.set_value(&format!("items[{}].name", key), json!(key.to_string())).unwrap();
                }
                Op::Remove(index) => {
                    let keys = form.item_keys("items").to_vec();
                    if let Some(key) = keys.get(index) {
                        form.remove("items", *key).unwrap();
                        removed.push(*key);
                    }
                }
                Op::Move(from, to) => {
                    let len = form.item_keys("items").len();
                    let result = form.move_item("items", from, to);
                    prop_assert_eq!(result.is_ok(), from < len && to < len);
                }
            }

            let next = form.registration("items").unwrap().next_key();
            prop_assert!(next >= last_next);
            last_next = next;

            for key in form.item_keys("items") {
                prop_assert_eq!(
                    form.value(&format!("items[{}].name", key)),
                    Some(&json!(key.to_string()))
                );
            }
            for key in &removed {
                let prefix = format!("items[{}].", key);
                prop_assert!(form.store().all_addresses().iter().all(|address| !address.starts_with(&prefix)));
            }
        }
    }
}
