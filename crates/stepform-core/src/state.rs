//! Owned state of one form instance.
//!
//! [`FormState`] holds the value store, the repeatable registrations and the cached condition results
//! for every conditioned field address. All mutation goes through it so that condition results,
//! errors and repeatable bookkeeping stay consistent with each other.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::address::{AddressError, FieldAddress, ItemKey, item_address, item_prefix};
use crate::condition::{
    FieldFlags, ItemScope, evaluate_flags, field_depends_on, static_flags,
};
use crate::error::{ErrorCode, ValidationError};
use crate::expr::{ValueSource, lookup_dotted};
use crate::repeatable::{Registrations, RepeatableError, RepeatableRegistration};
use crate::spec::field::FieldSpec;
use crate::spec::form::FormSpec;
use crate::store::{ValidationState, ValueStore};
use crate::structure::{destructure, set_nested, structure, structure_items};
use crate::validate::{
    ValidationContext, ValidationOutcome, Validator, validate_count, validate_field,
};

/// Rejected writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("unknown repeatable '{0}'")]
    UnknownRepeatable(String),
    #[error("repeatable '{repeatable}' has no live item '{key}'")]
    UnknownItem { repeatable: String, key: ItemKey },
    #[error("'{0}' is a repeatable; use append/remove/move instead of writing it directly")]
    RepeatableAddress(String),
}

/// Handle for an asynchronous validation started with [`FormState::begin_async_validation`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationTicket {
    address: String,
    value: Value,
    generation: u64,
}

impl ValidationTicket {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ValidatorKey {
    repeatable: Option<String>,
    field: String,
}

/// One live field address together with its definition.
struct Slot<'s> {
    address: String,
    field: &'s FieldSpec,
    item: Option<(&'s str, ItemKey, &'s [String])>,
}

impl<'s> Slot<'s> {
    fn scope(&self) -> Option<ItemScope<'s>> {
        self.item
            .map(|(repeatable, key, fields)| ItemScope::new(repeatable, key, fields))
    }
}

/// Read view used by condition evaluation and validators.
struct FormSource<'a> {
    store: &'a ValueStore,
    registrations: &'a Registrations,
}

impl ValueSource for FormSource<'_> {
    fn lookup(&self, path: &str) -> Option<Cow<'_, Value>> {
        if let Some(value) = self.store.get_value(path) {
            return Some(Cow::Borrowed(value));
        }
        if let Some(registration) = self.registrations.get(path) {
            return Some(Cow::Owned(Value::Array(structure_items(
                self.store,
                registration,
            ))));
        }
        let prefix = format!("{}.", path);
        let mut nested = Map::new();
        for (address, value) in self.store.entries_with_prefix(&prefix) {
            set_nested(&mut nested, &address[prefix.len()..], value.clone());
        }
        if nested.is_empty() {
            None
        } else {
            Some(Cow::Owned(Value::Object(nested)))
        }
    }
}

pub struct FormState {
    spec: FormSpec,
    defaults: Value,
    store: ValueStore,
    registrations: Registrations,
    flags: BTreeMap<String, FieldFlags>,
    form_errors: Vec<ValidationError>,
    validators: BTreeMap<ValidatorKey, Box<dyn Validator>>,
    generation: u64,
    validated: bool,
}

impl fmt::Debug for FormState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormState")
            .field("form", &self.spec.id)
            .field("store", &self.store)
            .field("registrations", &self.registrations)
            .field("flags", &self.flags)
            .field("form_errors", &self.form_errors)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl FormState {
    pub fn new(spec: FormSpec) -> Self {
        Self::with_defaults(spec, Value::Object(Map::new()))
    }

    /// Builds the form and seeds it from a nested default-value object.
    pub fn with_defaults(spec: FormSpec, defaults: Value) -> Self {
        let mut state = Self {
            spec,
            defaults,
            store: ValueStore::new(),
            registrations: Registrations::new(),
            flags: BTreeMap::new(),
            form_errors: Vec::new(),
            validators: BTreeMap::new(),
            generation: 0,
            validated: false,
        };
        state.load();
        state
    }

    pub fn spec(&self) -> &FormSpec {
        &self.spec
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub fn registration(&self, repeatable: &str) -> Option<&RepeatableRegistration> {
        self.registrations.get(repeatable)
    }

    pub fn registrations(&self) -> &Registrations {
        &self.registrations
    }

    pub fn item_keys(&self, repeatable: &str) -> &[ItemKey] {
        self.registrations
            .get(repeatable)
            .map(RepeatableRegistration::order)
            .unwrap_or(&[])
    }

    /// Incremented on every reset; async work started before a reset is discarded.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn value(&self, address: &str) -> Option<&Value> {
        self.store.get_value(address)
    }

    /// The nested object handed to consumers.
    pub fn values(&self) -> Value {
        structure(&self.store, &self.registrations)
    }

    /// Restores the defaults the form was built with.
    pub fn reset(&mut self) {
        self.load();
    }

    /// Replaces the defaults and restores them.
    pub fn reset_with(&mut self, defaults: Value) {
        self.defaults = defaults;
        self.load();
    }

    fn load(&mut self) {
        self.generation += 1;
        self.store.reset();
        self.flags.clear();
        self.form_errors.clear();
        self.validated = false;
        self.registrations = self
            .spec
            .repeatables
            .iter()
            .map(|spec| (spec.id.clone(), RepeatableRegistration::from_spec(spec)))
            .collect();

        let flat = destructure(
            &self.defaults,
            &self.spec.static_field_ids(),
            &mut self.registrations,
        );
        for (address, value) in flat {
            self.store.set_value(&address, value);
        }

        for field in &self.spec.fields {
            if !self.store.contains(&field.id) {
                self.store.set_value(&field.id, field.initial_value());
            }
        }

        for spec in &self.spec.repeatables {
            let Some(registration) = self.registrations.get_mut(&spec.id) else {
                continue;
            };
            if lookup_dotted(&self.defaults, &spec.id).is_none() {
                while registration.len() < registration.min() {
                    registration.seed_item(&mut self.store);
                }
            }
            for key in registration.order() {
                for (field, value) in registration.default_item() {
                    let address = item_address(&spec.id, *key, field);
                    if !self.store.contains(&address) {
                        self.store.set_value(&address, value.clone());
                    }
                }
            }
        }

        self.refresh_all();
        tracing::debug!(form = %self.spec.id, generation = self.generation, "form loaded");
    }

    /// Writes a value and recomputes every condition reading it.
    ///
    /// Plain addresses may be created freely; composite addresses must point at a live item.
    pub fn set_value(&mut self, address: &str, value: Value) -> Result<bool, FormError> {
        self.check_writable(address)?;
        let changed = self.store.set_value(address, value);
        if changed {
            self.refresh_dependents(address);
            if self.store.validation_state(address).is_some() {
                self.revalidate(address);
            }
        }
        Ok(changed)
    }

    fn check_writable(&self, address: &str) -> Result<(), FormError> {
        match FieldAddress::parse(address)? {
            FieldAddress::Field(id) => {
                if self.registrations.contains_key(&id) {
                    Err(FormError::RepeatableAddress(id))
                } else {
                    Ok(())
                }
            }
            FieldAddress::Item {
                repeatable, key, ..
            } => {
                let registration = self
                    .registrations
                    .get(&repeatable)
                    .ok_or_else(|| FormError::UnknownRepeatable(repeatable.clone()))?;
                if registration.contains_key(key) {
                    Ok(())
                } else {
                    Err(FormError::UnknownItem { repeatable, key })
                }
            }
        }
    }

    pub fn set_touched(&mut self, address: &str) -> bool {
        self.store.set_touched(address)
    }

    pub fn is_touched(&self, address: &str) -> bool {
        self.store.is_touched(address)
    }

    /// Attaches externally produced errors. Hidden or dead addresses are refused.
    pub fn set_errors(&mut self, address: &str, errors: Vec<ValidationError>) -> bool {
        if !self.flags(address).visible {
            return false;
        }
        self.store.set_errors(address, errors)
    }

    pub fn field_errors(&self, address: &str) -> &[ValidationError] {
        self.store.errors(address)
    }

    /// Group-level errors such as repeatable count violations.
    pub fn form_errors(&self) -> &[ValidationError] {
        &self.form_errors
    }

    /// Every current error keyed by address, form-level errors keyed by repeatable id.
    pub fn errors(&self) -> BTreeMap<String, Vec<ValidationError>> {
        let mut out: BTreeMap<String, Vec<ValidationError>> = self
            .store
            .error_entries()
            .map(|(address, errors)| (address.clone(), errors.clone()))
            .collect();
        for error in &self.form_errors {
            let key = error.path.clone().unwrap_or_else(|| self.spec.id.clone());
            out.entry(key).or_default().push(error.clone());
        }
        out
    }

    pub fn is_valid(&self) -> bool {
        self.form_errors.is_empty() && self.store.error_entries().next().is_none()
    }

    /// True while any asynchronous validation is outstanding.
    pub fn is_validating(&self) -> bool {
        self.slots().iter().any(|slot| {
            self.store.validation_state(&slot.address) == Some(ValidationState::Pending)
        })
    }

    /// Current flags of an address. Fields without conditions report their static flags.
    pub fn flags(&self, address: &str) -> FieldFlags {
        if let Some(flags) = self.flags.get(address) {
            return *flags;
        }
        self.slot(address)
            .map(|slot| static_flags(slot.field))
            .unwrap_or_default()
    }

    pub fn is_visible(&self, address: &str) -> bool {
        self.flags(address).visible
    }

    /// Addresses with a cached condition result, for auditing cleanup.
    pub fn flagged_addresses(&self) -> impl Iterator<Item = &str> {
        self.flags.keys().map(String::as_str)
    }

    /// Live field addresses in declaration order, item fields following item order.
    pub fn field_addresses(&self) -> Vec<String> {
        self.slots().into_iter().map(|slot| slot.address).collect()
    }

    /// Definition of the field behind a live address.
    pub fn field_spec(&self, address: &str) -> Option<&FieldSpec> {
        self.slot(address).map(|slot| slot.field)
    }

    pub fn register_validator(&mut self, field: &str, validator: Box<dyn Validator>) {
        self.validators.insert(
            ValidatorKey {
                repeatable: None,
                field: field.to_string(),
            },
            validator,
        );
    }

    /// Registers a validator for one field of every item of `repeatable`.
    pub fn register_item_validator(
        &mut self,
        repeatable: &str,
        field: &str,
        validator: Box<dyn Validator>,
    ) {
        self.validators.insert(
            ValidatorKey {
                repeatable: Some(repeatable.to_string()),
                field: field.to_string(),
            },
            validator,
        );
    }

    /// Validates every live field and the repeatable counts. Hidden fields are skipped and keep no errors.
    pub fn validate(&mut self) -> bool {
        self.validated = true;
        self.refresh_all();
        for address in self.field_addresses() {
            self.revalidate(&address);
        }
        self.refresh_form_errors();
        let valid = self.is_valid();
        tracing::debug!(form = %self.spec.id, valid, "form validated");
        valid
    }

    /// Marks an address as pending and hands out a ticket for an external asynchronous check.
    pub fn begin_async_validation(&mut self, address: &str) -> Option<ValidationTicket> {
        let value = self.store.get_value(address)?.clone();
        self.store
            .set_validation_state(address, ValidationState::Pending);
        Some(ValidationTicket {
            address: address.to_string(),
            value,
            generation: self.generation,
        })
    }

    /// Applies an asynchronous outcome unless the form was reset, the item removed, the value
    /// changed or the field hidden since the ticket was issued. Returns whether it was applied.
    pub fn complete_validation(
        &mut self,
        ticket: ValidationTicket,
        outcome: ValidationOutcome,
    ) -> bool {
        let current = self.store.get_value(&ticket.address);
        if ticket.generation != self.generation || current != Some(&ticket.value) {
            tracing::debug!(address = %ticket.address, "stale validation result discarded");
            return false;
        }
        if !self.flags(&ticket.address).visible {
            self.store.clear_validation(&ticket.address);
            return false;
        }
        let mut errors = self
            .compute_errors(&ticket.address)
            .map(|(_, errors)| errors)
            .unwrap_or_default();
        errors.extend(normalize_outcome(outcome, &ticket.address));
        self.store.set_errors(&ticket.address, errors);
        true
    }

    pub fn can_append(&self, repeatable: &str) -> bool {
        self.registrations
            .get(repeatable)
            .is_some_and(RepeatableRegistration::can_append)
    }

    pub fn can_remove(&self, repeatable: &str) -> bool {
        self.registrations
            .get(repeatable)
            .is_some_and(RepeatableRegistration::can_remove)
    }

    pub fn append(&mut self, repeatable: &str) -> Result<ItemKey, RepeatableError> {
        let registration = self
            .registrations
            .get_mut(repeatable)
            .ok_or_else(|| RepeatableError::UnknownRepeatable(repeatable.to_string()))?;
        let key = registration.append(&mut self.store)?;
        let prefix = item_prefix(repeatable, key);
        self.refresh_where(|slot| slot.address.starts_with(&prefix));
        self.refresh_dependents(repeatable);
        self.refresh_form_errors();
        Ok(key)
    }

    /// Removes an item; its values, touched flags, errors, validation states and cached condition
    /// results all go with it.
    pub fn remove(&mut self, repeatable: &str, key: ItemKey) -> Result<(), RepeatableError> {
        let registration = self
            .registrations
            .get_mut(repeatable)
            .ok_or_else(|| RepeatableError::UnknownRepeatable(repeatable.to_string()))?;
        registration.remove(key, &mut self.store)?;
        let prefix = item_prefix(repeatable, key);
        self.flags.retain(|address, _| !address.starts_with(&prefix));
        self.refresh_dependents(repeatable);
        self.refresh_form_errors();
        Ok(())
    }

    pub fn move_item(
        &mut self,
        repeatable: &str,
        from: usize,
        to: usize,
    ) -> Result<(), RepeatableError> {
        self.registrations
            .get_mut(repeatable)
            .ok_or_else(|| RepeatableError::UnknownRepeatable(repeatable.to_string()))?
            .move_item(from, to)?;
        self.refresh_dependents(repeatable);
        Ok(())
    }

    fn source(&self) -> FormSource<'_> {
        FormSource {
            store: &self.store,
            registrations: &self.registrations,
        }
    }

    fn slots(&self) -> Vec<Slot<'_>> {
        let mut slots: Vec<Slot<'_>> = self
            .spec
            .fields
            .iter()
            .map(|field| Slot {
                address: field.id.clone(),
                field,
                item: None,
            })
            .collect();
        for spec in &self.spec.repeatables {
            let Some(registration) = self.registrations.get(&spec.id) else {
                continue;
            };
            for key in registration.order() {
                for field in &spec.fields {
                    slots.push(Slot {
                        address: item_address(&spec.id, *key, &field.id),
                        field,
                        item: Some((spec.id.as_str(), *key, registration.item_field_ids())),
                    });
                }
            }
        }
        slots
    }

    fn slot(&self, address: &str) -> Option<Slot<'_>> {
        match FieldAddress::parse(address).ok()? {
            FieldAddress::Field(id) => self.spec.field(&id).map(|field| Slot {
                address: address.to_string(),
                field,
                item: None,
            }),
            FieldAddress::Item {
                repeatable,
                key,
                field,
            } => {
                let spec = self.spec.repeatable(&repeatable)?;
                let registration = self.registrations.get(&repeatable)?;
                if !registration.contains_key(key) {
                    return None;
                }
                let field = spec.field(&field)?;
                Some(Slot {
                    address: address.to_string(),
                    field,
                    item: Some((spec.id.as_str(), key, registration.item_field_ids())),
                })
            }
        }
    }

    fn compute_flags(&self, slot: &Slot<'_>) -> FieldFlags {
        if slot.field.conditions.is_empty() {
            return static_flags(slot.field);
        }
        evaluate_flags(slot.field, &self.source(), slot.scope().as_ref())
    }

    fn refresh_all(&mut self) {
        self.flags.clear();
        self.refresh_where(|_| true);
    }

    fn refresh_dependents(&mut self, changed: &str) {
        self.refresh_where(|slot| field_depends_on(slot.field, slot.scope().as_ref(), changed));
    }

    fn refresh_where<P>(&mut self, predicate: P)
    where
        P: Fn(&Slot<'_>) -> bool,
    {
        let computed: Vec<(String, FieldFlags)> = self
            .slots()
            .into_iter()
            .filter(|slot| !slot.field.conditions.is_empty() && predicate(slot))
            .map(|slot| {
                let flags = self.compute_flags(&slot);
                (slot.address, flags)
            })
            .collect();
        for (address, flags) in computed {
            self.apply_flags(address, flags);
        }
    }

    fn apply_flags(&mut self, address: String, flags: FieldFlags) {
        let previous = self.flags.insert(address.clone(), flags);
        if !flags.visible {
            self.store.clear_validation(&address);
            return;
        }
        if self.validated && previous.is_some_and(|previous| previous != flags) {
            self.revalidate(&address);
        }
    }

    fn revalidate(&mut self, address: &str) {
        match self.compute_errors(address) {
            Some((flags, _)) if !flags.visible => self.store.clear_validation(address),
            Some((_, errors)) => {
                self.store.set_errors(address, errors);
            }
            None => {}
        }
    }

    fn compute_errors(&self, address: &str) -> Option<(FieldFlags, Vec<ValidationError>)> {
        let slot = self.slot(address)?;
        let flags = self.flags(address);
        let value = self.store.get_value(address).cloned().unwrap_or(Value::Null);
        let mut errors = validate_field(slot.field, &value, flags, address);
        if !flags.visible || !errors.is_empty() {
            return Some((flags, errors));
        }
        let key = ValidatorKey {
            repeatable: slot.item.map(|(repeatable, _, _)| repeatable.to_string()),
            field: slot.field.id.clone(),
        };
        if let Some(validator) = self.validators.get(&key) {
            let source = self.source();
            let ctx = ValidationContext {
                address,
                field_id: &slot.field.id,
                item: slot.item.map(|(repeatable, key, _)| (repeatable, key)),
                source: &source,
            };
            errors.extend(normalize_outcome(validator.validate(&value, &ctx), address));
        }
        Some((flags, errors))
    }

    fn refresh_form_errors(&mut self) {
        if !self.validated {
            return;
        }
        self.form_errors = self
            .registrations
            .values()
            .filter_map(validate_count)
            .collect();
    }
}

fn normalize_outcome(outcome: ValidationOutcome, address: &str) -> Vec<ValidationError> {
    let mut errors: Vec<ValidationError> = outcome
        .errors
        .into_iter()
        .map(|error| {
            if error.path.is_none() {
                error.at(address)
            } else {
                error
            }
        })
        .collect();
    if !outcome.is_valid && errors.is_empty() {
        errors.push(ValidationError::new(ErrorCode::ValidationError, "invalid value").at(address));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::when;
    use crate::spec::field::FieldType;
    use crate::spec::form::RepeatableSpec;
    use serde_json::json;

    fn contact_form() -> FormSpec {
        FormSpec::new("contact")
            .with_field(FieldSpec::new("email", FieldType::String).required())
            .with_field(FieldSpec::new("newsletter", FieldType::Boolean).with_default(false))
            .with_field(
                FieldSpec::new("topics", FieldType::Array)
                    .visible_when(when("newsletter").equals(true))
                    .required_when(when("newsletter").equals(true)),
            )
    }

    #[test]
    fn static_fields_are_seeded() {
        let form = FormState::new(contact_form());
        assert_eq!(form.value("email"), Some(&Value::Null));
        assert_eq!(form.value("newsletter"), Some(&json!(false)));
        assert!(!form.is_visible("topics"));
    }

    #[test]
    fn writing_a_dependency_recomputes_flags() {
        let mut form = FormState::new(contact_form());
        form.set_value("newsletter", json!(true)).unwrap();
        let flags = form.flags("topics");
        assert!(flags.visible && flags.required);
    }

    #[test]
    fn repeatable_ids_are_not_directly_writable() {
        let spec = FormSpec::new("order").with_repeatable(RepeatableSpec::new(
            "items",
            vec![FieldSpec::new("name", FieldType::String)],
        ));
        let mut form = FormState::new(spec);
        assert_eq!(
            form.set_value("items", json!([])),
            Err(FormError::RepeatableAddress("items".into()))
        );
        assert!(matches!(
            form.set_value("items[k7].name", json!("x")),
            Err(FormError::UnknownItem { .. })
        ));
    }

    #[test]
    fn fixing_a_value_clears_its_error() {
        let mut form = FormState::new(contact_form());
        assert!(!form.validate());
        assert_eq!(form.field_errors("email").len(), 1);
        form.set_value("email", json!("me@example.com")).unwrap();
        assert!(form.field_errors("email").is_empty());
        assert!(form.is_valid());
    }

    #[test]
    fn stale_async_validation_is_discarded() {
        let mut form = FormState::new(contact_form());
        form.set_value("email", json!("taken@example.com")).unwrap();
        let ticket = form.begin_async_validation("email").unwrap();
        assert!(form.is_validating());
        form.set_value("email", json!("free@example.com")).unwrap();
        let applied = form.complete_validation(
            ticket,
            ValidationOutcome::invalid(vec![ValidationError::new(
                ErrorCode::ValidationError,
                "already registered",
            )]),
        );
        assert!(!applied);
        assert!(form.field_errors("email").is_empty());
    }

    #[test]
    fn async_validation_applies_to_unchanged_value() {
        let mut form = FormState::new(contact_form());
        form.set_value("email", json!("taken@example.com")).unwrap();
        let ticket = form.begin_async_validation("email").unwrap();
        let applied = form.complete_validation(
            ticket,
            ValidationOutcome::invalid(vec![ValidationError::new(
                ErrorCode::ValidationError,
                "already registered",
            )]),
        );
        assert!(applied);
        assert_eq!(form.field_errors("email")[0].path.as_deref(), Some("email"));
        assert!(!form.is_valid());
    }

    #[test]
    fn async_validation_after_reset_is_discarded() {
        let mut form = FormState::new(contact_form());
        form.set_value("email", json!("a@b.c")).unwrap();
        let ticket = form.begin_async_validation("email").unwrap();
        form.reset();
        assert!(!form.complete_validation(ticket, ValidationOutcome::valid()));
    }

    #[test]
    fn custom_validators_run_after_builtin_checks() {
        let mut form = FormState::new(contact_form());
        form.register_validator(
            "email",
            Box::new(|value: &Value, _ctx: &ValidationContext<'_>| {
                if value.as_str().is_some_and(|text| text.contains('@')) {
                    ValidationOutcome::valid()
                } else {
                    ValidationOutcome::invalid(Vec::new())
                }
            }),
        );
        form.set_value("email", json!("nope")).unwrap();
        assert!(!form.validate());
        assert_eq!(form.field_errors("email")[0].message, "invalid value");
    }
}
