//! Conversion between the flat address-keyed store and the nested object shape consumers see.
//!
//! [`structure`] walks each repeatable in its `order`, so removing or moving items never leaves gaps.
//! [`destructure`] allocates one fresh key per array element and is only meant for initialization.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::address::{FieldAddress, item_address};
use crate::repeatable::{Registrations, RepeatableRegistration};
use crate::store::ValueStore;

/// Builds the nested object from the store. Empty repeatables structure to `[]`.
pub fn structure(store: &ValueStore, registrations: &Registrations) -> Value {
    let mut root = Map::new();

    for (address, value) in store.values() {
        if matches!(FieldAddress::parse(address), Ok(FieldAddress::Item { .. })) {
            continue;
        }
        set_nested(&mut root, address, value.clone());
    }

    for registration in registrations.values() {
        let items = structure_items(store, registration);
        set_nested(&mut root, registration.id(), Value::Array(items));
    }

    Value::Object(root)
}

/// Items of one repeatable, in order.
pub fn structure_items(store: &ValueStore, registration: &RepeatableRegistration) -> Vec<Value> {
    registration
        .order()
        .iter()
        .map(|key| {
            let prefix = registration.prefix(*key);
            let mut item = Map::new();
            for (address, value) in store.entries_with_prefix(&prefix) {
                set_nested(&mut item, &address[prefix.len()..], value.clone());
            }
            Value::Object(item)
        })
        .collect()
}

/// Flattens a nested object into addresses, allocating item keys in `registrations`.
///
/// `static_fields` are the configured non-repeatable field ids; they stop the descent into nested
/// objects so that object-valued fields are stored whole. Unknown keys are kept at their dotted path.
pub fn destructure(
    nested: &Value,
    static_fields: &BTreeSet<String>,
    registrations: &mut Registrations,
) -> BTreeMap<String, Value> {
    let mut flattener = Flattener {
        static_fields,
        registrations,
        out: BTreeMap::new(),
    };
    if let Some(object) = nested.as_object() {
        flattener.walk(None, object);
    } else if !nested.is_null() {
        tracing::warn!("destructure expects an object; ignoring non-object input");
    }
    flattener.out
}

struct Flattener<'a> {
    static_fields: &'a BTreeSet<String>,
    registrations: &'a mut Registrations,
    out: BTreeMap<String, Value>,
}

impl Flattener<'_> {
    fn walk(&mut self, base: Option<&str>, object: &Map<String, Value>) {
        for (key, value) in object {
            let path = join(base, key);
            if self.registrations.contains_key(&path) {
                self.walk_items(&path, value);
            } else if self.static_fields.contains(&path) {
                self.out.insert(path, value.clone());
            } else if let Value::Object(inner) = value
                && self.has_descendants(&path)
            {
                self.walk(Some(&path), inner);
            } else {
                self.out.insert(path, value.clone());
            }
        }
    }

    fn walk_items(&mut self, repeatable: &str, value: &Value) {
        let Some(registration) = self.registrations.get_mut(repeatable) else {
            return;
        };
        let items = match value {
            Value::Array(items) => items,
            Value::Null => return,
            _ => {
                tracing::warn!(repeatable, "repeatable value is not an array; ignoring");
                return;
            }
        };
        let item_fields: BTreeSet<String> =
            registration.item_field_ids().iter().cloned().collect();
        for item in items {
            let key = registration.allocate_key();
            let Value::Object(fields) = item else {
                tracing::warn!(repeatable, %key, "repeatable item is not an object");
                continue;
            };
            let mut flat = BTreeMap::new();
            flatten_item(None, fields, &item_fields, &mut flat);
            for (field, value) in flat {
                self.out
                    .insert(item_address(repeatable, key, &field), value);
            }
        }
    }

    fn has_descendants(&self, path: &str) -> bool {
        let prefix = format!("{}.", path);
        self.static_fields
            .iter()
            .chain(self.registrations.keys())
            .any(|id| id.starts_with(&prefix))
    }
}

fn flatten_item(
    base: Option<&str>,
    object: &Map<String, Value>,
    known: &BTreeSet<String>,
    out: &mut BTreeMap<String, Value>,
) {
    for (key, value) in object {
        let path = join(base, key);
        if !known.contains(&path)
            && let Value::Object(inner) = value
        {
            let prefix = format!("{}.", path);
            if known.iter().any(|id| id.starts_with(&prefix)) {
                flatten_item(Some(&path), inner, known, out);
                continue;
            }
        }
        out.insert(path, value.clone());
    }
}

fn join(base: Option<&str>, key: &str) -> String {
    match base {
        Some(base) => format!("{}.{}", base, key),
        None => key.to_string(),
    }
}

/// Writes `value` at a dotted path, creating intermediate objects as needed.
pub fn set_nested(root: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            root.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = root
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set_nested(child, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::field::{FieldSpec, FieldType};
    use crate::spec::form::RepeatableSpec;
    use serde_json::json;

    fn setup() -> (BTreeSet<String>, Registrations) {
        let fields = BTreeSet::from(["email".to_string(), "address.city".to_string()]);
        let spec = RepeatableSpec::new(
            "items",
            vec![
                FieldSpec::new("name", FieldType::String),
                FieldSpec::new("qty", FieldType::Integer),
            ],
        );
        let registrations =
            Registrations::from([("items".to_string(), RepeatableRegistration::from_spec(&spec))]);
        (fields, registrations)
    }

    #[test]
    fn destructure_allocates_fresh_keys() {
        let (fields, mut registrations) = setup();
        let nested = json!({
            "email": "a@b.c",
            "address": { "city": "Oslo" },
            "items": [{ "name": "bolt", "qty": 2 }, { "name": "nut", "qty": 5 }]
        });
        let flat = destructure(&nested, &fields, &mut registrations);
        assert_eq!(flat["email"], json!("a@b.c"));
        assert_eq!(flat["address.city"], json!("Oslo"));
        assert_eq!(flat["items[k0].name"], json!("bolt"));
        assert_eq!(flat["items[k1].qty"], json!(5));
        assert_eq!(registrations["items"].len(), 2);
    }

    #[test]
    fn empty_repeatable_structures_to_empty_array() {
        let (_, registrations) = setup();
        let store = ValueStore::new();
        assert_eq!(structure(&store, &registrations), json!({ "items": [] }));
    }

    #[test]
    fn structure_follows_order_not_keys() {
        let (fields, mut registrations) = setup();
        let nested = json!({ "items": [{ "name": "a" }, { "name": "b" }, { "name": "c" }] });
        let store = ValueStore::from_values(destructure(&nested, &fields, &mut registrations));
        registrations
            .get_mut("items")
            .unwrap()
            .move_item(2, 0)
            .unwrap();
        assert_eq!(
            structure(&store, &registrations),
            json!({ "items": [{ "name": "c" }, { "name": "a" }, { "name": "b" }] })
        );
    }

    #[test]
    fn unknown_keys_survive_the_round_trip() {
        let (fields, mut registrations) = setup();
        let nested = json!({ "extra": { "deep": true }, "items": [] });
        let store = ValueStore::from_values(destructure(&nested, &fields, &mut registrations));
        assert_eq!(structure(&store, &registrations), nested);
    }
}
