use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// Outcome of the most recent validation run for an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    Pending,
    Valid,
    Invalid,
}

/// Flat address-keyed value store with parallel touched/error/validation-state maps.
///
/// The auxiliary maps only ever hold live addresses: writes to them for an address without a value
/// are refused, and [`ValueStore::remove_prefix`] drops an address from every map at once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueStore {
    values: BTreeMap<String, Value>,
    touched: BTreeMap<String, bool>,
    errors: BTreeMap<String, Vec<ValidationError>>,
    validation_state: BTreeMap<String, ValidationState>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: BTreeMap<String, Value>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    /// Writes a value, creating the address if it is not live yet. Returns true if the value changed.
    pub fn set_value(&mut self, address: &str, value: Value) -> bool {
        match self.values.get(address) {
            Some(existing) if *existing == value => false,
            _ => {
                tracing::trace!(address, "store value updated");
                self.values.insert(address.to_string(), value);
                true
            }
        }
    }

    pub fn get_value(&self, address: &str) -> Option<&Value> {
        self.values.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.values.contains_key(address)
    }

    pub fn set_touched(&mut self, address: &str) -> bool {
        if !self.contains(address) {
            return false;
        }
        self.touched.insert(address.to_string(), true);
        true
    }

    pub fn is_touched(&self, address: &str) -> bool {
        self.touched.get(address).copied().unwrap_or(false)
    }

    /// Replaces the errors of a live address; an empty list clears them along with the
    /// validation state.
    pub fn set_errors(&mut self, address: &str, errors: Vec<ValidationError>) -> bool {
        if !self.contains(address) {
            return false;
        }
        if errors.is_empty() {
            self.errors.remove(address);
            self.validation_state
                .insert(address.to_string(), ValidationState::Valid);
        } else {
            self.errors.insert(address.to_string(), errors);
            self.validation_state
                .insert(address.to_string(), ValidationState::Invalid);
        }
        true
    }

    pub fn errors(&self, address: &str) -> &[ValidationError] {
        self.errors.get(address).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_validation_state(&mut self, address: &str, state: ValidationState) -> bool {
        if !self.contains(address) {
            return false;
        }
        self.validation_state.insert(address.to_string(), state);
        true
    }

    pub fn validation_state(&self, address: &str) -> Option<ValidationState> {
        self.validation_state.get(address).copied()
    }

    /// Drops errors and validation state of an address while keeping its value and touched flag.
    pub fn clear_validation(&mut self, address: &str) {
        self.errors.remove(address);
        self.validation_state.remove(address);
    }

    /// Removes one address from every map.
    pub fn remove(&mut self, address: &str) -> Option<Value> {
        self.touched.remove(address);
        self.errors.remove(address);
        self.validation_state.remove(address);
        self.values.remove(address)
    }

    /// Removes every address starting with `prefix` from every map and returns how many values went away.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let doomed: Vec<String> = self
            .values
            .range(prefix.to_string()..)
            .take_while(|(address, _)| address.starts_with(prefix))
            .map(|(address, _)| address.clone())
            .collect();
        self.touched.retain(|address, _| !address.starts_with(prefix));
        self.errors.retain(|address, _| !address.starts_with(prefix));
        self.validation_state
            .retain(|address, _| !address.starts_with(prefix));
        for address in &doomed {
            self.values.remove(address);
        }
        doomed.len()
    }

    /// Empties every map.
    pub fn reset(&mut self) {
        self.values.clear();
        self.touched.clear();
        self.errors.clear();
        self.validation_state.clear();
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Entries whose address starts with `prefix`, in address order.
    pub fn entries_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Value)> + 'a {
        self.values
            .range(prefix.to_string()..)
            .take_while(move |(address, _)| address.starts_with(prefix))
    }

    pub fn error_entries(&self) -> impl Iterator<Item = (&String, &Vec<ValidationError>)> {
        self.errors.iter()
    }

    /// Every address present in any map, used to audit cleanup.
    pub fn all_addresses(&self) -> Vec<&str> {
        let mut addresses: Vec<&str> = self
            .values
            .keys()
            .chain(self.touched.keys())
            .chain(self.errors.keys())
            .chain(self.validation_state.keys())
            .map(String::as_str)
            .collect();
        addresses.sort_unstable();
        addresses.dedup();
        addresses
    }
}
