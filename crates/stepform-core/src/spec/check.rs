use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::address::FieldAddress;
use crate::spec::form::FormSpec;
use crate::spec::workflow::WorkflowSpec;

/// Configuration problem found by [`FormSpec::check`] or [`WorkflowSpec::check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecIssue {
    pub path: String,
    pub message: String,
}

impl SpecIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SpecIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl FormSpec {
    /// Checks ids, bounds and condition paths against the form's address space.
    pub fn check(&self) -> Vec<SpecIssue> {
        let mut issues = Vec::new();
        let mut seen = BTreeSet::new();

        for id in self
            .fields
            .iter()
            .map(|field| &field.id)
            .chain(self.repeatables.iter().map(|repeatable| &repeatable.id))
        {
            if id.is_empty() {
                issues.push(SpecIssue::new(&self.id, "empty field or repeatable id"));
            } else if id.contains('[') || id.contains(']') {
                issues.push(SpecIssue::new(id, "ids may not contain brackets"));
            } else if !seen.insert(id.as_str()) {
                issues.push(SpecIssue::new(id, "duplicate id"));
            }
        }

        for field in &self.fields {
            for path in field.conditions.paths() {
                if !self.knows_path(path) {
                    issues.push(SpecIssue::new(
                        &field.id,
                        format!("condition references unknown path '{}'", path),
                    ));
                }
            }
        }

        for repeatable in &self.repeatables {
            if let Some(max) = repeatable.max
                && repeatable.min > max
            {
                issues.push(SpecIssue::new(
                    &repeatable.id,
                    format!("min {} exceeds max {}", repeatable.min, max),
                ));
            }
            let mut item_ids = BTreeSet::new();
            for field in &repeatable.fields {
                let location = format!("{}.{}", repeatable.id, field.id);
                if !item_ids.insert(field.id.as_str()) {
                    issues.push(SpecIssue::new(&location, "duplicate item field id"));
                }
                for path in field.conditions.paths() {
                    if repeatable.field(path).is_none() && !self.knows_path(path) {
                        issues.push(SpecIssue::new(
                            &location,
                            format!("condition references unknown path '{}'", path),
                        ));
                    }
                }
            }
        }

        issues
    }

    /// True when `path` names a static field, a prefix of dotted static fields, a repeatable, or a
    /// composite address into a known repeatable field.
    pub fn knows_path(&self, path: &str) -> bool {
        match FieldAddress::parse(path) {
            Ok(FieldAddress::Field(id)) => {
                self.field(&id).is_some()
                    || self.repeatable(&id).is_some()
                    || self
                        .fields
                        .iter()
                        .any(|field| field.id.starts_with(&format!("{}.", id)))
            }
            Ok(FieldAddress::Item {
                repeatable, field, ..
            }) => self
                .repeatable(&repeatable)
                .is_some_and(|spec| spec.field(&field).is_some()),
            Err(_) => false,
        }
    }
}

impl WorkflowSpec {
    /// Checks step ids, every step form, and step-level condition paths.
    pub fn check(&self) -> Vec<SpecIssue> {
        let mut issues = Vec::new();
        if self.steps.is_empty() {
            issues.push(SpecIssue::new(&self.id, "workflow has no steps"));
        }

        let mut seen = BTreeSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                issues.push(SpecIssue::new(&step.id, "duplicate step id"));
            }
            for issue in step.form_spec().check() {
                issues.push(SpecIssue::new(
                    format!("{}.{}", step.id, issue.path),
                    issue.message,
                ));
            }
        }

        for step in &self.steps {
            let paths = step
                .conditions
                .visible
                .iter()
                .chain(step.conditions.allow_skip.iter())
                .flat_map(|expr| expr.paths());
            for path in paths {
                if !self.knows_step_path(path) {
                    issues.push(SpecIssue::new(
                        &step.id,
                        format!("step condition references unknown path '{}'", path),
                    ));
                }
            }
        }

        issues
    }

    fn knows_step_path(&self, path: &str) -> bool {
        let Some((step_id, rest)) = path.split_once('.') else {
            return self.step_index(path).is_some();
        };
        self.steps
            .iter()
            .find(|step| step.id == step_id)
            .is_some_and(|step| step.form_spec().knows_path(rest))
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::when;
    use crate::spec::field::{FieldSpec, FieldType};
    use crate::spec::form::{FormSpec, RepeatableSpec};
    use crate::spec::workflow::{StepSpec, WorkflowSpec};

    #[test]
    fn accepts_scoped_item_conditions() {
        let form = FormSpec::new("order").with_repeatable(RepeatableSpec::new(
            "items",
            vec![
                FieldSpec::new("type", FieldType::String),
                FieldSpec::new("weight", FieldType::Number)
                    .visible_when(when("type").equals("physical")),
            ],
        ));
        assert!(form.check().is_empty());
    }

    #[test]
    fn reports_unknown_paths_and_bad_bounds() {
        let form = FormSpec::new("order")
            .with_field(FieldSpec::new("email", FieldType::String).visible_when(when("nope").exists()))
            .with_repeatable(
                RepeatableSpec::new("items", vec![FieldSpec::new("name", FieldType::String)])
                    .bounds(3, Some(1)),
            );
        let issues = form.check();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|issue| issue.message.contains("'nope'")));
        assert!(issues.iter().any(|issue| issue.message.contains("exceeds max")));
    }

    #[test]
    fn duplicate_ids_are_reported() {
        let form = FormSpec::new("dup")
            .with_field(FieldSpec::new("a", FieldType::String))
            .with_field(FieldSpec::new("a", FieldType::String));
        assert_eq!(form.check().len(), 1);
    }

    #[test]
    fn step_conditions_resolve_against_step_forms() {
        let workflow = WorkflowSpec::new(
            "checkout",
            vec![
                StepSpec::new("products").with_field(FieldSpec::new("items", FieldType::Array)),
                StepSpec::new("company").visible_when(when("products.items").contains("X")),
                StepSpec::new("review").visible_when(when("billing.total").exists()),
            ],
        );
        let issues = workflow.check();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "review");
    }
}
