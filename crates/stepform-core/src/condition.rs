//! Field and step flag resolution on top of [`Expr`].
//!
//! Conditions attached to a field inside a repeatable item are evaluated in that item's scope: a bare
//! path naming a sibling item field is rewritten to the composite address of the same item. Any other
//! path is looked up as written, so items can read global state but never a sibling item's values.

use serde::{Deserialize, Serialize};

use crate::address::{ItemKey, item_address};
use crate::expr::{Expr, ValueSource};
use crate::spec::field::FieldSpec;

/// Dynamic state of one field address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFlags {
    pub visible: bool,
    pub required: bool,
    pub disabled: bool,
    pub readonly: bool,
}

impl Default for FieldFlags {
    fn default() -> Self {
        Self {
            visible: true,
            required: false,
            disabled: false,
            readonly: false,
        }
    }
}

/// Evaluation scope of a field that lives inside a repeatable item.
#[derive(Debug, Clone, Copy)]
pub struct ItemScope<'a> {
    pub repeatable: &'a str,
    pub key: ItemKey,
    pub item_fields: &'a [String],
}

impl<'a> ItemScope<'a> {
    pub fn new(repeatable: &'a str, key: ItemKey, item_fields: &'a [String]) -> Self {
        Self {
            repeatable,
            key,
            item_fields,
        }
    }
}

/// Rewrites a condition path for the given scope.
pub fn resolve_path(path: &str, scope: Option<&ItemScope<'_>>) -> String {
    match scope {
        Some(scope) if scope.item_fields.iter().any(|field| field == path) => {
            item_address(scope.repeatable, scope.key, path)
        }
        _ => path.to_string(),
    }
}

/// Evaluates an expression inside an optional item scope.
pub fn evaluate_scoped<S>(expr: &Expr, source: &S, scope: Option<&ItemScope<'_>>) -> bool
where
    S: ValueSource + ?Sized,
{
    expr.evaluate_with(source, &|path: &str| resolve_path(path, scope))
}

/// Computes the flags of a field. Static `required` is OR-ed with the `required` condition.
pub fn evaluate_flags<S>(field: &FieldSpec, source: &S, scope: Option<&ItemScope<'_>>) -> FieldFlags
where
    S: ValueSource + ?Sized,
{
    let conditions = &field.conditions;
    let check = |expr: &Option<Expr>, fallback: bool| {
        expr.as_ref()
            .map_or(fallback, |expr| evaluate_scoped(expr, source, scope))
    };
    FieldFlags {
        visible: check(&conditions.visible, true),
        required: field.required || check(&conditions.required, false),
        disabled: check(&conditions.disabled, false),
        readonly: check(&conditions.readonly, false),
    }
}

/// Static flags of a field without conditions.
pub fn static_flags(field: &FieldSpec) -> FieldFlags {
    FieldFlags {
        required: field.required,
        ..FieldFlags::default()
    }
}

/// True when a condition reading `resolved` must be recomputed after `changed` was written: exact
/// match, a write below a nested object path, a write into an item of a repeatable read whole, or a
/// change to a repeatable or object that contains the path read.
pub fn depends_on(resolved: &str, changed: &str) -> bool {
    if resolved == changed {
        return true;
    }
    let below = |path: &str, root: &str| {
        path.strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
    };
    below(changed, resolved) || below(resolved, changed)
}

/// True when any condition of `field`, resolved in `scope`, reads `changed`.
pub fn field_depends_on(field: &FieldSpec, scope: Option<&ItemScope<'_>>, changed: &str) -> bool {
    field
        .conditions
        .paths()
        .into_iter()
        .any(|path| depends_on(&resolve_path(path, scope), changed))
}
