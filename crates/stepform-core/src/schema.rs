use schemars::schema_for;
use serde_json::Value;

use crate::spec::{FormSpec, WorkflowSpec};

/// JSON Schema of the form configuration document.
pub fn form_schema() -> Value {
    schema_for!(FormSpec).to_value()
}

/// JSON Schema of the workflow configuration document.
pub fn workflow_schema() -> Value {
    schema_for!(WorkflowSpec).to_value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_schema_names_fields_and_repeatables() {
        let schema = form_schema();
        let properties = &schema["properties"];
        assert!(properties.get("fields").is_some());
        assert!(properties.get("repeatables").is_some());
        assert_eq!(schema["required"], serde_json::json!(["id"]));
    }

    #[test]
    fn workflow_schema_requires_steps() {
        let schema = workflow_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|value| value == "steps"));
    }
}
