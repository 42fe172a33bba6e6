use serde::Serialize;
use serde_json::{Value, json};

use crate::address::FieldAddress;
use crate::error::ValidationError;
use crate::expr::is_empty_value;
use crate::spec::form::FormSpec;
use crate::state::FormState;
use crate::workflow::Workflow;

/// Status labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    /// Visible fields still need values.
    NeedInput,
    /// Errors are attached to the form.
    Invalid,
    /// Every visible field is filled and no errors are present.
    Complete,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::NeedInput => "need_input",
            RenderStatus::Invalid => "invalid",
            RenderStatus::Complete => "complete",
        }
    }
}

/// Progress counters over visible fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderProgress {
    pub filled: usize,
    pub total: usize,
}

/// Position of a field inside a repeatable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderItem {
    pub repeatable: String,
    pub index: usize,
}

/// Describes one live field. `handle` is opaque to consumers; it is what they pass back on writes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderField {
    pub handle: String,
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<RenderItem>,
    pub visible: bool,
    pub required: bool,
    pub disabled: bool,
    pub readonly: bool,
    pub touched: bool,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderGroup {
    pub id: String,
    pub count: usize,
    pub min: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
    pub can_append: bool,
    pub can_remove: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderStep {
    pub id: String,
    pub title: String,
    pub visible: bool,
    pub current: bool,
    pub visited: bool,
    pub skipped: bool,
}

/// Navigation context added when a form is rendered as part of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderWorkflow {
    pub workflow_id: String,
    pub current_step: String,
    pub is_first_step: bool,
    pub is_last_step: bool,
    pub can_skip: bool,
    pub completed: bool,
    pub steps: Vec<RenderStep>,
}

/// Collected payload used by both text and JSON renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPayload {
    pub form_id: String,
    pub form_title: String,
    pub form_version: String,
    pub status: RenderStatus,
    pub progress: RenderProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    pub fields: Vec<RenderField>,
    pub repeatables: Vec<RenderGroup>,
    pub form_errors: Vec<ValidationError>,
    pub values: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<RenderWorkflow>,
}

/// Build the renderer payload from a form's current state.
pub fn build_render_payload(form: &FormState) -> RenderPayload {
    let spec = form.spec();
    let fields: Vec<RenderField> = form
        .field_addresses()
        .into_iter()
        .filter_map(|address| render_field(form, address))
        .collect();

    let visible: Vec<&RenderField> = fields.iter().filter(|field| field.visible).collect();
    let filled = visible
        .iter()
        .filter(|field| !is_empty_value(&field.value))
        .count();
    let progress = RenderProgress {
        filled,
        total: visible.len(),
    };

    let has_errors = !form.is_valid();
    let missing_required = visible
        .iter()
        .any(|field| field.required && is_empty_value(&field.value));
    let status = if has_errors {
        RenderStatus::Invalid
    } else if missing_required {
        RenderStatus::NeedInput
    } else {
        RenderStatus::Complete
    };

    let repeatables = spec
        .repeatables
        .iter()
        .map(|group| RenderGroup {
            id: group.id.clone(),
            count: form.item_keys(&group.id).len(),
            min: group.min,
            max: group.max,
            can_append: form.can_append(&group.id),
            can_remove: form.can_remove(&group.id),
        })
        .collect();

    RenderPayload {
        form_id: spec.id.clone(),
        form_title: spec.title.clone(),
        form_version: spec.version.clone(),
        status,
        progress,
        help: spec.description.clone(),
        fields,
        repeatables,
        form_errors: form.form_errors().to_vec(),
        values: form.values(),
        workflow: None,
    }
}

/// Payload for the current step of a workflow.
pub fn build_workflow_payload(workflow: &Workflow) -> RenderPayload {
    let mut payload = match workflow.current_form() {
        Some(form) => build_render_payload(form),
        None => {
            let empty = FormState::new(FormSpec::new(workflow.spec().id.clone()));
            build_render_payload(&empty)
        }
    };
    let state = workflow.state();
    let visible = workflow.visible_steps();
    let steps = workflow
        .spec()
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| RenderStep {
            id: step.id.clone(),
            title: if step.title.is_empty() {
                step.id.clone()
            } else {
                step.title.clone()
            },
            visible: visible.contains(&index),
            current: index == state.current_step_index,
            visited: state.visited_steps.contains(&step.id),
            skipped: state.skipped_steps.contains(&step.id),
        })
        .collect();
    payload.workflow = Some(RenderWorkflow {
        workflow_id: workflow.spec().id.clone(),
        current_step: workflow
            .current_step()
            .map(|step| step.id.clone())
            .unwrap_or_default(),
        is_first_step: workflow.is_first_step(),
        is_last_step: workflow.is_last_step(),
        can_skip: workflow.can_skip(),
        completed: workflow.is_complete(),
        steps,
    });
    payload
}

fn render_field(form: &FormState, address: String) -> Option<RenderField> {
    let field = form.field_spec(&address)?;
    let flags = form.flags(&address);
    let item = match FieldAddress::parse(&address).ok()? {
        FieldAddress::Field(_) => None,
        FieldAddress::Item {
            repeatable, key, ..
        } => {
            let index = form.registration(&repeatable)?.index_of(key)?;
            Some(RenderItem { repeatable, index })
        }
    };
    Some(RenderField {
        id: field.id.clone(),
        title: field.label().to_string(),
        kind: field.kind.as_str(),
        item,
        visible: flags.visible,
        required: flags.required,
        disabled: flags.disabled,
        readonly: flags.readonly,
        touched: form.is_touched(&address),
        value: form.value(&address).cloned().unwrap_or(Value::Null),
        choices: field.choices.clone(),
        errors: form.field_errors(&address).to_vec(),
        handle: address,
    })
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    serde_json::to_value(payload).unwrap_or_else(|err| {
        tracing::warn!(form = %payload.form_id, error = %err, "render payload not serializable");
        json!({ "form_id": payload.form_id, "status": payload.status.as_str() })
    })
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Form: {} ({})", payload.form_title, payload.form_id));
    if let Some(workflow) = &payload.workflow {
        let path = workflow
            .steps
            .iter()
            .filter(|step| step.visible)
            .map(|step| {
                if step.current {
                    format!("[{}]", step.id)
                } else {
                    step.id.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" > ");
        lines.push(format!("Steps: {}", path));
    }
    lines.push(format!(
        "Status: {} ({}/{})",
        payload.status.as_str(),
        payload.progress.filled,
        payload.progress.total
    ));
    if let Some(help) = &payload.help {
        lines.push(format!("Help: {}", help));
    }

    lines.push("Visible fields:".to_string());
    for field in payload.fields.iter().filter(|field| field.visible) {
        let name = match &field.item {
            Some(item) => format!("{}[{}].{}", item.repeatable, item.index, field.id),
            None => field.id.clone(),
        };
        let mut entry = format!(" - {} ({})", name, field.title);
        if field.required {
            entry.push_str(" [required]");
        }
        if field.readonly {
            entry.push_str(" [readonly]");
        }
        if !is_empty_value(&field.value) {
            entry.push_str(&format!(" = {}", value_to_display(&field.value)));
        }
        lines.push(entry);
        for error in &field.errors {
            lines.push(format!("     ! {}", error.message));
        }
    }

    for error in &payload.form_errors {
        lines.push(format!(" ! {}", error.message));
    }

    lines.join("\n")
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(num) => num.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::when;
    use crate::spec::field::{FieldSpec, FieldType};
    use crate::spec::form::{FormSpec, RepeatableSpec};

    fn order_form() -> FormSpec {
        FormSpec::new("order")
            .with_field(FieldSpec::new("customer", FieldType::String).required())
            .with_repeatable(
                RepeatableSpec::new(
                    "items",
                    vec![
                        FieldSpec::new("kind", FieldType::Enum)
                            .with_choices(["physical", "digital"]),
                        FieldSpec::new("weight", FieldType::Number)
                            .visible_when(when("kind").equals("physical")),
                    ],
                )
                .bounds(1, Some(3)),
            )
    }

    #[test]
    fn payload_lists_item_fields_by_index() {
        let form = FormState::new(order_form());
        let payload = build_render_payload(&form);
        assert_eq!(payload.status, RenderStatus::NeedInput);
        let kind = payload
            .fields
            .iter()
            .find(|field| field.id == "kind")
            .unwrap();
        assert_eq!(
            kind.item,
            Some(RenderItem {
                repeatable: "items".into(),
                index: 0
            })
        );
        let weight = payload
            .fields
            .iter()
            .find(|field| field.id == "weight")
            .unwrap();
        assert!(!weight.visible);
        assert_eq!(payload.repeatables[0].count, 1);
        assert!(!payload.repeatables[0].can_remove);
    }

    #[test]
    fn text_render_hides_invisible_fields() {
        let form = FormState::new(order_form());
        let text = render_text(&build_render_payload(&form));
        assert!(text.contains("customer (customer) [required]"));
        assert!(text.contains("items[0].kind"));
        assert!(!text.contains("weight"));
    }

    #[test]
    fn json_render_uses_type_key() {
        let form = FormState::new(order_form());
        let ui = render_json_ui(&build_render_payload(&form));
        assert_eq!(ui["fields"][0]["type"], "string");
        assert_eq!(ui["values"]["items"][0]["kind"], Value::Null);
        assert!(ui.get("workflow").is_none());
    }

    #[test]
    fn workflow_without_steps_renders_empty_navigation() {
        let flow = Workflow::new(crate::spec::workflow::WorkflowSpec::new("empty", vec![]));
        let payload = build_workflow_payload(&flow);
        assert!(payload.fields.is_empty());
        let nav = payload.workflow.expect("workflow context");
        assert_eq!(nav.current_step, "");
        assert!(nav.steps.is_empty());
        assert!(!nav.can_skip);
    }
}
