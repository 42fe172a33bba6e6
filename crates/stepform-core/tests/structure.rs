use proptest::prelude::*;
use serde_json::{Value, json};

use stepform_core::{FieldSpec, FieldType, FormSpec, FormState, RepeatableSpec};

fn fixture(name: &str) -> &'static str {
    match name {
        "order_form" => include_str!("fixtures/order_form.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

fn order_form() -> FormSpec {
    serde_json::from_str(fixture("order_form")).expect("deserialize")
}

fn catalog() -> FormSpec {
    FormSpec::new("catalog")
        .with_field(FieldSpec::new("owner", FieldType::String))
        .with_repeatable(RepeatableSpec::new(
            "entries",
            vec![
                FieldSpec::new("label", FieldType::String),
                FieldSpec::new("count", FieldType::Integer),
            ],
        ))
}

#[test]
fn full_order_round_trips() {
    let order = json!({
        "customer": "Ada",
        "address": { "city": "Oslo" },
        "gift": true,
        "gift_note": "Happy birthday",
        "items": [
            { "name": "lamp", "kind": "physical", "qty": 2, "weight": 1.5 },
            { "name": "ebook", "kind": "digital", "qty": 1, "weight": null }
        ]
    });
    let form = FormState::with_defaults(order_form(), order.clone());
    assert_eq!(form.values(), order);
}

#[test]
fn supplied_indices_are_not_reused_as_keys() {
    let form = FormState::with_defaults(
        catalog(),
        json!({ "owner": "x", "entries": [{ "label": "a", "count": 1 }, { "label": "b", "count": 2 }] }),
    );
    let keys: Vec<String> = form
        .item_keys("entries")
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(keys, vec!["k0", "k1"]);
    assert_eq!(form.value("entries[k1].label"), Some(&json!("b")));
}

#[test]
fn empty_group_structures_to_empty_array() {
    let form = FormState::with_defaults(catalog(), json!({ "owner": "x", "entries": [] }));
    assert_eq!(form.values()["entries"], json!([]));

    let untouched = FormState::new(catalog());
    assert_eq!(untouched.values(), json!({ "owner": null, "entries": [] }));
}

#[test]
fn removing_the_middle_item_leaves_no_gap() {
    let mut form = FormState::with_defaults(
        catalog(),
        json!({
            "owner": "x",
            "entries": [
                { "label": "first", "count": 1 },
                { "label": "middle", "count": 2 },
                { "label": "last", "count": 3 }
            ]
        }),
    );
    let middle = form.item_keys("entries")[1];
    form.remove("entries", middle).unwrap();

    let items = form.values()["entries"].clone();
    assert_eq!(
        items,
        json!([
            { "label": "first", "count": 1 },
            { "label": "last", "count": 3 }
        ])
    );
    assert!(items.as_array().unwrap().iter().all(Value::is_object));
}

#[test]
fn reset_rebuilds_items_with_fresh_registration() {
    let mut form = FormState::with_defaults(
        catalog(),
        json!({ "owner": "x", "entries": [{ "label": "a", "count": 1 }] }),
    );
    form.append("entries").unwrap();
    form.set_value("owner", json!("y")).unwrap();
    form.reset();
    assert_eq!(form.item_keys("entries").len(), 1);
    assert_eq!(form.registration("entries").unwrap().next_key(), 1);
    assert_eq!(form.value("owner"), Some(&json!("x")));
}

fn entry() -> impl Strategy<Value = Value> {
    ("[a-z]{0,6}", 0i64..1000).prop_map(|(label, count)| json!({ "label": label, "count": count }))
}

proptest! {
    #[test]
    fn structure_inverts_destructure(
        owner in proptest::option::of("[a-z ]{0,8}"),
        entries in proptest::collection::vec(entry(), 0..6),
    ) {
        let nested = json!({ "owner": owner, "entries": entries });
        let form = FormState::with_defaults(catalog(), nested.clone());
        prop_assert_eq!(form.values(), nested);
    }
}
