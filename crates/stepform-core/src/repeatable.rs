//! Composite-key allocation, ordering and cleanup for repeatable groups.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::address::{ItemKey, item_address, item_prefix};
use crate::spec::form::RepeatableSpec;
use crate::store::ValueStore;

/// Expected failures of repeatable mutations; they are returned, never panicked on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepeatableError {
    #[error("repeatable '{0}' is at its maximum item count")]
    AtMax(String),
    #[error("repeatable '{0}' is at its minimum item count")]
    BelowMin(String),
    #[error("unknown repeatable '{0}'")]
    UnknownRepeatable(String),
    #[error("repeatable '{repeatable}' has no item '{key}'")]
    UnknownKey { repeatable: String, key: ItemKey },
    #[error("index {index} is out of range for repeatable '{repeatable}' ({len} items)")]
    IndexOutOfRange {
        repeatable: String,
        index: usize,
        len: usize,
    },
}

/// Runtime registration of one repeatable group.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatableRegistration {
    id: String,
    order: Vec<ItemKey>,
    next_key: u64,
    min: usize,
    max: usize,
    item_field_ids: Vec<String>,
    default_item: Map<String, Value>,
}

/// Registrations keyed by repeatable id.
pub type Registrations = BTreeMap<String, RepeatableRegistration>;

impl RepeatableRegistration {
    pub fn from_spec(spec: &RepeatableSpec) -> Self {
        Self {
            id: spec.id.clone(),
            order: Vec::new(),
            next_key: 0,
            min: spec.min,
            max: spec.max.unwrap_or(usize::MAX),
            item_field_ids: spec.fields.iter().map(|field| field.id.clone()).collect(),
            default_item: spec.default_item_value(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Item keys in array order.
    pub fn order(&self) -> &[ItemKey] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn next_key(&self) -> u64 {
        self.next_key
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn item_field_ids(&self) -> &[String] {
        &self.item_field_ids
    }

    pub fn default_item(&self) -> &Map<String, Value> {
        &self.default_item
    }

    pub fn contains_key(&self, key: ItemKey) -> bool {
        self.order.contains(&key)
    }

    pub fn index_of(&self, key: ItemKey) -> Option<usize> {
        self.order.iter().position(|candidate| *candidate == key)
    }

    pub fn is_fixed_size(&self) -> bool {
        self.min == self.max
    }

    pub fn can_append(&self) -> bool {
        !self.is_fixed_size() && self.order.len() < self.max
    }

    pub fn can_remove(&self) -> bool {
        !self.is_fixed_size() && self.order.len() > self.min
    }

    /// Allocates the next key without touching the value store. Used when items are rebuilt from
    /// nested data, where the values come from the caller instead of the item defaults.
    pub(crate) fn allocate_key(&mut self) -> ItemKey {
        let key = ItemKey::new(self.next_key);
        self.next_key += 1;
        self.order.push(key);
        key
    }

    /// Appends a new item seeded with the default item value.
    pub fn append(&mut self, store: &mut ValueStore) -> Result<ItemKey, RepeatableError> {
        if !self.can_append() {
            return Err(RepeatableError::AtMax(self.id.clone()));
        }
        let key = self.seed_item(store);
        tracing::debug!(repeatable = %self.id, %key, count = self.order.len(), "item appended");
        Ok(key)
    }

    /// Allocates a key and writes the default item, ignoring the bounds. Used to fill a group up to
    /// its minimum when a form is loaded.
    pub(crate) fn seed_item(&mut self, store: &mut ValueStore) -> ItemKey {
        let key = self.allocate_key();
        for field_id in &self.item_field_ids {
            let value = self
                .default_item
                .get(field_id)
                .cloned()
                .unwrap_or(Value::Null);
            store.set_value(&item_address(&self.id, key, field_id), value);
        }
        key
    }

    /// Removes an item and every store entry under its prefix.
    pub fn remove(&mut self, key: ItemKey, store: &mut ValueStore) -> Result<(), RepeatableError> {
        let index = self
            .index_of(key)
            .ok_or_else(|| RepeatableError::UnknownKey {
                repeatable: self.id.clone(),
                key,
            })?;
        if !self.can_remove() {
            return Err(RepeatableError::BelowMin(self.id.clone()));
        }
        self.order.remove(index);
        let removed = store.remove_prefix(&self.prefix(key));
        tracing::debug!(repeatable = %self.id, %key, removed, "item removed");
        Ok(())
    }

    /// Reorders items; keys and stored values stay untouched.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<(), RepeatableError> {
        let len = self.order.len();
        for index in [from, to] {
            if index >= len {
                return Err(RepeatableError::IndexOutOfRange {
                    repeatable: self.id.clone(),
                    index,
                    len,
                });
            }
        }
        let key = self.order.remove(from);
        self.order.insert(to, key);
        Ok(())
    }

    pub fn prefix(&self, key: ItemKey) -> String {
        item_prefix(&self.id, key)
    }
}
