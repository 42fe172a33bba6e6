use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::spec::field::FieldSpec;

/// Repeating group of fields with inclusive count bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RepeatableSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub min: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
    pub fields: Vec<FieldSpec>,
    /// Values seeded into a freshly appended item; fields missing here fall back to their own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_item: Option<Map<String, Value>>,
}

impl RepeatableSpec {
    pub fn new(id: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            id: id.into(),
            title: None,
            min: 0,
            max: None,
            fields,
            default_item: None,
        }
    }

    pub fn bounds(mut self, min: usize, max: Option<usize>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn field(&self, id: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.id == id)
    }

    /// Full default value of one item.
    pub fn default_item_value(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|field| {
                let value = self
                    .default_item
                    .as_ref()
                    .and_then(|item| item.get(&field.id))
                    .cloned()
                    .unwrap_or_else(|| field.initial_value());
                (field.id.clone(), value)
            })
            .collect()
    }
}

/// Top-level form definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormSpec {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repeatables: Vec<RepeatableSpec>,
}

pub(crate) fn default_version() -> String {
    "1.0.0".into()
}

impl FormSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            version: default_version(),
            description: None,
            fields: Vec::new(),
            repeatables: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_repeatable(mut self, repeatable: RepeatableSpec) -> Self {
        self.repeatables.push(repeatable);
        self
    }

    pub fn field(&self, id: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.id == id)
    }

    pub fn repeatable(&self, id: &str) -> Option<&RepeatableSpec> {
        self.repeatables
            .iter()
            .find(|repeatable| repeatable.id == id)
    }

    /// Ids of the static (non-repeatable) fields.
    pub fn static_field_ids(&self) -> BTreeSet<String> {
        self.fields.iter().map(|field| field.id.clone()).collect()
    }
}
