pub mod check;
pub mod field;
pub mod form;
pub mod workflow;

pub use check::SpecIssue;
pub use field::{ConditionSet, Constraint, FieldSpec, FieldType};
pub use form::{FormSpec, RepeatableSpec};
pub use workflow::{StepConditions, StepId, StepSpec, WorkflowPolicy, WorkflowSpec};
