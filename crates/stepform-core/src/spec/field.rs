use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expr::Expr;

/// Supported field value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Boolean,
    Integer,
    Number,
    Enum,
    Array,
    Any,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Enum => "enum",
            FieldType::Array => "array",
            FieldType::Any => "any",
        }
    }
}

/// Value constraints checked during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Constraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Conditions controlling the dynamic flags of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct ConditionSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readonly: Option<Expr>,
}

impl ConditionSet {
    pub fn is_empty(&self) -> bool {
        self.visible.is_none()
            && self.required.is_none()
            && self.disabled.is_none()
            && self.readonly.is_none()
    }

    pub fn expressions(&self) -> impl Iterator<Item = &Expr> {
        [
            self.visible.as_ref(),
            self.required.as_ref(),
            self.disabled.as_ref(),
            self.readonly.as_ref(),
        ]
        .into_iter()
        .flatten()
    }

    /// Every path any of the conditions reads.
    pub fn paths(&self) -> Vec<&str> {
        self.expressions().flat_map(Expr::paths).collect()
    }
}

/// Declarative field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSpec {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Constraint>,
    #[serde(default, skip_serializing_if = "ConditionSet::is_empty")]
    pub conditions: ConditionSet,
}

impl FieldSpec {
    pub fn new(id: impl Into<String>, kind: FieldType) -> Self {
        Self {
            id: id.into(),
            kind,
            title: None,
            required: false,
            default: None,
            choices: None,
            constraint: None,
            conditions: ConditionSet::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn visible_when(mut self, expr: Expr) -> Self {
        self.conditions.visible = Some(expr);
        self
    }

    pub fn required_when(mut self, expr: Expr) -> Self {
        self.conditions.required = Some(expr);
        self
    }

    pub fn disabled_when(mut self, expr: Expr) -> Self {
        self.conditions.disabled = Some(expr);
        self
    }

    pub fn readonly_when(mut self, expr: Expr) -> Self {
        self.conditions.readonly = Some(expr);
        self
    }

    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }

    /// Value seeded when nothing else provides one.
    pub fn initial_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }
}
