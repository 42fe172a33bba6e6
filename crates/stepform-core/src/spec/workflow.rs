use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::spec::field::FieldSpec;
use crate::spec::form::{FormSpec, RepeatableSpec, default_version};

/// Identifier of a workflow step.
pub type StepId = String;

/// Conditions evaluated against workflow-wide data (`<step id>.<field>` paths).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct StepConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_skip: Option<Expr>,
}

impl StepConditions {
    pub fn is_empty(&self) -> bool {
        self.visible.is_none() && self.allow_skip.is_none()
    }
}

/// One page of a workflow; it owns the fields of its own sub-form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepSpec {
    pub id: StepId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repeatables: Vec<RepeatableSpec>,
    #[serde(default)]
    pub allow_skip: bool,
    #[serde(default, skip_serializing_if = "StepConditions::is_empty")]
    pub conditions: StepConditions,
}

impl StepSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            description: None,
            fields: Vec::new(),
            repeatables: Vec::new(),
            allow_skip: false,
            conditions: StepConditions::default(),
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

    pub fn skippable(mut self) -> Self {
        self.allow_skip = true;
        self
    }

    pub fn visible_when(mut self, expr: Expr) -> Self {
        self.conditions.visible = Some(expr);
        self
    }

    pub fn skippable_when(mut self, expr: Expr) -> Self {
        self.conditions.allow_skip = Some(expr);
        self
    }

    /// The sub-form owned by this step.
    pub fn form_spec(&self) -> FormSpec {
        FormSpec {
            id: self.id.clone(),
            title: self.title.clone(),
            version: default_version(),
            description: self.description.clone(),
            fields: self.fields.clone(),
            repeatables: self.repeatables.clone(),
        }
    }
}

/// Runtime policy of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowPolicy {
    /// Storage key used for snapshots; defaults to the workflow id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_key: Option<String>,
    /// Save a snapshot at every transition boundary.
    #[serde(default = "default_autosave")]
    pub autosave: bool,
}

fn default_autosave() -> bool {
    true
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            persist_key: None,
            autosave: true,
        }
    }
}

/// Multi-step workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowSpec {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub steps: Vec<StepSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<WorkflowPolicy>,
}

impl WorkflowSpec {
    pub fn new(id: impl Into<String>, steps: Vec<StepSpec>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            version: default_version(),
            steps,
            policy: None,
        }
    }

    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.id == id)
    }

    pub fn persist_key(&self) -> &str {
        self.policy
            .as_ref()
            .and_then(|policy| policy.persist_key.as_deref())
            .unwrap_or(&self.id)
    }

    pub fn autosave(&self) -> bool {
        self.policy.as_ref().is_none_or(|policy| policy.autosave)
    }
}
