use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::ItemKey;
use crate::condition::FieldFlags;
use crate::error::{ErrorCode, ValidationError};
use crate::expr::{ValueSource, is_empty_value};
use crate::repeatable::RepeatableRegistration;
use crate::spec::field::{Constraint, FieldSpec, FieldType};

/// Result shape of every validator, built-in or external.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationError>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// What a validator gets to see besides the value itself.
pub struct ValidationContext<'a> {
    pub address: &'a str,
    pub field_id: &'a str,
    pub item: Option<(&'a str, ItemKey)>,
    pub source: &'a dyn ValueSource,
}

/// External validation hook registered per field id.
pub trait Validator {
    fn validate(&self, value: &Value, ctx: &ValidationContext<'_>) -> ValidationOutcome;
}

impl<F> Validator for F
where
    F: Fn(&Value, &ValidationContext<'_>) -> ValidationOutcome,
{
    fn validate(&self, value: &Value, ctx: &ValidationContext<'_>) -> ValidationOutcome {
        self(value, ctx)
    }
}

/// Built-in checks for one field address. Hidden fields never produce errors.
pub fn validate_field(
    field: &FieldSpec,
    value: &Value,
    flags: FieldFlags,
    address: &str,
) -> Vec<ValidationError> {
    if !flags.visible {
        return Vec::new();
    }

    if is_empty_value(value) {
        if field.required {
            return vec![base_error(
                address,
                ErrorCode::ValidationError,
                format!("{} is required", field.label()),
            )];
        }
        if flags.required {
            return vec![base_error(
                address,
                ErrorCode::ConditionalRequired,
                format!("{} is required", field.label()),
            )];
        }
        return Vec::new();
    }

    if !matches_type(field.kind, value) {
        return vec![base_error(
            address,
            ErrorCode::ValidationError,
            format!("expected a value of type {}", field.kind.as_str()),
        )];
    }

    if let Some(constraint) = &field.constraint
        && let Some(error) = enforce_constraint(address, value, constraint)
    {
        return vec![error];
    }

    if matches!(field.kind, FieldType::Enum)
        && let Some(choices) = &field.choices
        && let Some(text) = value.as_str()
        && !choices.iter().any(|choice| choice == text)
    {
        return vec![base_error(
            address,
            ErrorCode::ValidationError,
            "invalid enum option",
        )];
    }

    Vec::new()
}

/// Group-level count check, reported against the repeatable id.
pub fn validate_count(registration: &RepeatableRegistration) -> Option<ValidationError> {
    let count = registration.len();
    if count < registration.min() {
        return Some(base_error(
            registration.id(),
            ErrorCode::RepeatableMinCount,
            format!(
                "at least {} item(s) required, found {}",
                registration.min(),
                count
            ),
        ));
    }
    if count > registration.max() {
        return Some(base_error(
            registration.id(),
            ErrorCode::RepeatableMaxCount,
            format!(
                "at most {} item(s) allowed, found {}",
                registration.max(),
                count
            ),
        ));
    }
    None
}

fn matches_type(kind: FieldType, value: &Value) -> bool {
    match kind {
        FieldType::String | FieldType::Enum => value.is_string(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Number => value.is_number(),
        FieldType::Array => value.is_array(),
        FieldType::Any => true,
    }
}

fn enforce_constraint(
    address: &str,
    value: &Value,
    constraint: &Constraint,
) -> Option<ValidationError> {
    if let Some(pattern) = &constraint.pattern
        && let Some(text) = value.as_str()
    {
        match Regex::new(pattern) {
            Ok(regex) if !regex.is_match(text) => {
                return Some(base_error(
                    address,
                    ErrorCode::ValidationError,
                    "value does not match pattern",
                ));
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(address, pattern, error = %err, "invalid constraint pattern ignored");
            }
        }
    }

    let length = value
        .as_str()
        .map(|text| text.chars().count())
        .or_else(|| value.as_array().map(Vec::len));

    if let Some(min_len) = constraint.min_len
        && let Some(length) = length
        && length < min_len
    {
        return Some(base_error(
            address,
            ErrorCode::ValidationError,
            "shorter than min length",
        ));
    }

    if let Some(max_len) = constraint.max_len
        && let Some(length) = length
        && length > max_len
    {
        return Some(base_error(
            address,
            ErrorCode::ValidationError,
            "longer than max length",
        ));
    }

    if let Some(min) = constraint.min
        && let Some(number) = value.as_f64()
        && number < min
    {
        return Some(base_error(
            address,
            ErrorCode::ValidationError,
            "value below minimum",
        ));
    }

    if let Some(max) = constraint.max
        && let Some(number) = value.as_f64()
        && number > max
    {
        return Some(base_error(
            address,
            ErrorCode::ValidationError,
            "value above maximum",
        ));
    }

    None
}

fn base_error(address: &str, code: ErrorCode, message: impl Into<String>) -> ValidationError {
    ValidationError::new(code, message).at(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn visible() -> FieldFlags {
        FieldFlags::default()
    }

    #[test]
    fn static_required_uses_validation_error() {
        let field = FieldSpec::new("name", FieldType::String).required();
        let errors = validate_field(&field, &json!(""), visible(), "name");
        assert_eq!(errors[0].code, ErrorCode::ValidationError);
        assert_eq!(errors[0].path.as_deref(), Some("name"));
    }

    #[test]
    fn conditional_required_only_when_visible() {
        let field = FieldSpec::new("weight", FieldType::Number);
        let required = FieldFlags {
            required: true,
            ..FieldFlags::default()
        };
        let errors = validate_field(&field, &Value::Null, required, "items[k0].weight");
        assert_eq!(errors[0].code, ErrorCode::ConditionalRequired);

        let hidden = FieldFlags {
            visible: false,
            ..required
        };
        assert!(validate_field(&field, &Value::Null, hidden, "items[k0].weight").is_empty());
    }

    #[test]
    fn type_and_constraints_are_enforced() {
        let field = FieldSpec::new("code", FieldType::String).with_constraint(Constraint {
            pattern: Some("^[A-Z]{3}$".into()),
            ..Constraint::default()
        });
        assert_eq!(validate_field(&field, &json!(12), visible(), "code").len(), 1);
        assert_eq!(validate_field(&field, &json!("abc"), visible(), "code").len(), 1);
        assert!(validate_field(&field, &json!("ABC"), visible(), "code").is_empty());

        let qty = FieldSpec::new("qty", FieldType::Integer).with_constraint(Constraint {
            min: Some(1.0),
            max: Some(10.0),
            ..Constraint::default()
        });
        assert_eq!(
            validate_field(&qty, &json!(11), visible(), "qty")[0].message,
            "value above maximum"
        );
    }

    #[test]
    fn enum_choices_are_checked() {
        let field = FieldSpec::new("kind", FieldType::Enum).with_choices(["physical", "digital"]);
        assert!(validate_field(&field, &json!("digital"), visible(), "kind").is_empty());
        assert_eq!(
            validate_field(&field, &json!("service"), visible(), "kind")[0].message,
            "invalid enum option"
        );
    }
}
