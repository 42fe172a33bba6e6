#![allow(missing_docs)]

pub mod address;
pub mod analytics;
pub mod condition;
pub mod error;
pub mod expr;
pub mod persistence;
pub mod render;
pub mod repeatable;
pub mod schema;
pub mod spec;
pub mod state;
pub mod store;
pub mod structure;
pub mod validate;
pub mod workflow;

pub use address::{AddressError, FieldAddress, ItemKey};
pub use analytics::{
    AnalyticsSink, ErrorEvent, SinkError, StepEvent, TracingSink, ValidationErrorEvent,
    WorkflowEvent,
};
pub use condition::FieldFlags;
pub use error::{ErrorCode, HookError, ValidationError};
pub use expr::{Expr, ValueSource, when};
pub use persistence::{
    FileStorage, MemoryStorage, PersistenceAdapter, PersistenceError, SNAPSHOT_VERSION,
    WorkflowSnapshot,
};
pub use render::{
    RenderField, RenderPayload, RenderProgress, RenderStatus, build_render_payload,
    build_workflow_payload, render_json_ui, render_text,
};
pub use repeatable::{RepeatableError, RepeatableRegistration};
pub use schema::{form_schema, workflow_schema};
pub use spec::{
    ConditionSet, Constraint, FieldSpec, FieldType, FormSpec, RepeatableSpec, SpecIssue,
    StepConditions, StepId, StepSpec, WorkflowPolicy, WorkflowSpec,
};
pub use state::{FormError, FormState, ValidationTicket};
pub use store::{ValidationState, ValueStore};
pub use structure::{destructure, structure};
pub use validate::{ValidationContext, ValidationOutcome, Validator};
pub use workflow::{
    NavigationError, PendingTransition, StepChange, StepContext, StepHook, StepMutator,
    Transition, Workflow, WorkflowState,
};
