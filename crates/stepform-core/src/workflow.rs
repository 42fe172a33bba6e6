//! Multi-step navigation over per-step forms.
//!
//! A [`Workflow`] owns one [`FormState`] per step plus the navigation state. Navigation is guarded:
//! while a transition or submission is in flight every other navigation call is rejected with
//! [`NavigationError::Busy`]. Asynchronous step hooks go through [`Workflow::begin_next`] and
//! [`Workflow::complete_next`]; a reset in between turns the pending transition stale.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::analytics::{
    AnalyticsSink, ErrorEvent, SinkError, StepEvent, ValidationErrorEvent, WorkflowEvent,
};
use crate::error::{ErrorCode, HookError, ValidationError};
use crate::persistence::{
    PersistenceAdapter, PersistenceError, SNAPSHOT_VERSION, WorkflowSnapshot,
};
use crate::spec::workflow::{StepSpec, WorkflowSpec};
use crate::state::FormState;

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("a transition or submission is already in progress")]
    Busy,
    #[error("step index {index} is out of range ({len} steps)")]
    OutOfRange { index: usize, len: usize },
    #[error("step '{0}' is hidden")]
    StepHidden(String),
    #[error("already at the first visible step")]
    AtFirstStep,
    #[error("step '{0}' cannot be skipped")]
    SkipNotAllowed(String),
    #[error("step '{step}' has validation errors")]
    Invalid {
        step: String,
        errors: BTreeMap<String, Vec<ValidationError>>,
    },
    #[error("step hook failed: {0}")]
    Hook(HookError),
    #[error("workflow completion failed: {0}")]
    Completion(HookError),
    #[error("transition was superseded by a reset")]
    Stale,
}

/// What a successful navigation call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Moved { from: usize, to: usize },
    Submitted,
}

/// Navigation state, readable by consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowState {
    pub current_step_index: usize,
    pub all_data: Map<String, Value>,
    pub visited_steps: BTreeSet<String>,
    pub skipped_steps: BTreeSet<String>,
    pub is_submitting: bool,
    pub is_transitioning: bool,
}

/// Passed to step hooks.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub workflow_id: &'a str,
    pub step_id: &'a str,
    pub step_index: usize,
    /// Structured values of the step being left.
    pub data: &'a Value,
    /// Structured values of every step, keyed by step id.
    pub all_data: &'a Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum Mutation {
    SetValue {
        step: String,
        address: String,
        value: Value,
    },
    ReplaceStep {
        step: String,
        data: Value,
    },
}

/// Collects data changes requested by a step hook; they are applied once the hook succeeds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepMutator {
    mutations: Vec<Mutation>,
}

impl StepMutator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one address of a step's form.
    pub fn set_value(&mut self, step: &str, address: &str, value: impl Into<Value>) {
        self.mutations.push(Mutation::SetValue {
            step: step.to_string(),
            address: address.to_string(),
            value: value.into(),
        });
    }

    /// Replaces a step's data with a nested object, rebuilding its repeatable items.
    pub fn replace_step_data(&mut self, step: &str, data: Value) {
        self.mutations.push(Mutation::ReplaceStep {
            step: step.to_string(),
            data,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Runs after a step validated and before the workflow moves on.
pub trait StepHook {
    fn after_validation(
        &mut self,
        ctx: &StepContext<'_>,
        mutator: &mut StepMutator,
    ) -> Result<(), HookError>;
}

impl<F> StepHook for F
where
    F: FnMut(&StepContext<'_>, &mut StepMutator) -> Result<(), HookError>,
{
    fn after_validation(
        &mut self,
        ctx: &StepContext<'_>,
        mutator: &mut StepMutator,
    ) -> Result<(), HookError> {
        self(ctx, mutator)
    }
}

/// Arguments of the step change callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepChange<'a> {
    pub from: usize,
    pub to: usize,
    pub from_step: &'a str,
    pub to_step: &'a str,
}

type ChangeCallback = Box<dyn FnMut(&StepChange<'_>) -> Result<(), HookError>>;
type CompleteCallback = Box<dyn FnMut(&Value) -> Result<(), HookError>>;

/// A validated step waiting for its hook to resolve.
#[derive(Debug)]
pub struct PendingTransition {
    stamp: u64,
    workflow_id: String,
    step_index: usize,
    step_id: String,
    data: Value,
    all_data: Map<String, Value>,
}

impl PendingTransition {
    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn context(&self) -> StepContext<'_> {
        StepContext {
            workflow_id: &self.workflow_id,
            step_id: &self.step_id,
            step_index: self.step_index,
            data: &self.data,
            all_data: &self.all_data,
        }
    }
}

pub struct Workflow {
    spec: WorkflowSpec,
    initial: Value,
    forms: Vec<FormState>,
    state: WorkflowState,
    stamp: u64,
    completed: bool,
    hooks: BTreeMap<String, Box<dyn StepHook>>,
    on_step_change: Option<ChangeCallback>,
    on_complete: Option<CompleteCallback>,
    analytics: Option<Box<dyn AnalyticsSink>>,
    storage: Option<Box<dyn PersistenceAdapter>>,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("workflow", &self.spec.id)
            .field("state", &self.state)
            .field("stamp", &self.stamp)
            .field("completed", &self.completed)
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Workflow {
    pub fn new(spec: WorkflowSpec) -> Self {
        Self::with_data(spec, Value::Object(Map::new()))
    }

    /// Builds the workflow with initial data keyed by step id.
    pub fn with_data(spec: WorkflowSpec, initial: Value) -> Self {
        let forms = spec
            .steps
            .iter()
            .map(|step| FormState::with_defaults(step.form_spec(), step_defaults(&initial, step)))
            .collect();
        let mut workflow = Self {
            spec,
            initial,
            forms,
            state: WorkflowState {
                current_step_index: 0,
                all_data: Map::new(),
                visited_steps: BTreeSet::new(),
                skipped_steps: BTreeSet::new(),
                is_submitting: false,
                is_transitioning: false,
            },
            stamp: 0,
            completed: false,
            hooks: BTreeMap::new(),
            on_step_change: None,
            on_complete: None,
            analytics: None,
            storage: None,
        };
        workflow.rewind();
        workflow
    }

    pub fn with_hook(mut self, step: &str, hook: impl StepHook + 'static) -> Self {
        self.hooks.insert(step.to_string(), Box::new(hook));
        self
    }

    pub fn on_step_change(
        mut self,
        callback: impl FnMut(&StepChange<'_>) -> Result<(), HookError> + 'static,
    ) -> Self {
        self.on_step_change = Some(Box::new(callback));
        self
    }

    pub fn on_complete(
        mut self,
        callback: impl FnMut(&Value) -> Result<(), HookError> + 'static,
    ) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn with_analytics(mut self, sink: impl AnalyticsSink + 'static) -> Self {
        self.analytics = Some(Box::new(sink));
        self
    }

    pub fn with_storage(mut self, storage: impl PersistenceAdapter + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    pub fn spec(&self) -> &WorkflowSpec {
        &self.spec
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn current_step_index(&self) -> usize {
        self.state.current_step_index
    }

    /// `None` only for a workflow without steps.
    pub fn current_step(&self) -> Option<&StepSpec> {
        self.spec.steps.get(self.state.current_step_index)
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn form(&self, step: &str) -> Option<&FormState> {
        self.spec.step_index(step).map(|index| &self.forms[index])
    }

    pub fn form_mut(&mut self, step: &str) -> Option<&mut FormState> {
        self.spec.step_index(step).map(|index| &mut self.forms[index])
    }

    pub fn current_form(&self) -> Option<&FormState> {
        self.forms.get(self.state.current_step_index)
    }

    pub fn current_form_mut(&mut self) -> Option<&mut FormState> {
        self.forms.get_mut(self.state.current_step_index)
    }

    /// Live structured values of every step, keyed by step id.
    pub fn data(&self) -> Value {
        Value::Object(self.collect_data())
    }

    pub fn is_step_visible(&self, index: usize) -> bool {
        self.step_visible_in(index, &self.data())
    }

    /// Indices of the steps currently visible, in order.
    pub fn visible_steps(&self) -> Vec<usize> {
        let data = self.data();
        (0..self.spec.steps.len())
            .filter(|index| self.step_visible_in(*index, &data))
            .collect()
    }

    pub fn next_visible(&self, from: usize) -> Option<usize> {
        let data = self.data();
        (from + 1..self.spec.steps.len()).find(|index| self.step_visible_in(*index, &data))
    }

    pub fn previous_visible(&self, from: usize) -> Option<usize> {
        let data = self.data();
        (0..from)
            .rev()
            .find(|index| self.step_visible_in(*index, &data))
    }

    pub fn is_first_step(&self) -> bool {
        self.previous_visible(self.state.current_step_index).is_none()
    }

    /// True when no visible step follows the current one.
    pub fn is_last_step(&self) -> bool {
        self.next_visible(self.state.current_step_index).is_none()
    }

    /// Resolved `allow_skip` of the current step.
    pub fn can_skip(&self) -> bool {
        self.current_step().is_some_and(|step| {
            step.allow_skip
                || step
                    .conditions
                    .allow_skip
                    .as_ref()
                    .is_some_and(|expr| expr.evaluate(&self.data()))
        })
    }

    /// Emits the workflow start and first step start events.
    pub fn start(&mut self) {
        let workflow = self.workflow_event();
        self.emit("workflow_start", |sink| sink.on_workflow_start(&workflow));
        if self.current_step().is_some() {
            let step = self.step_event(self.state.current_step_index);
            self.emit("step_start", |sink| sink.on_step_start(&step));
        }
    }

    /// Reports abandonment unless the workflow already completed. Returns whether it was reported.
    pub fn abandon(&mut self) -> bool {
        if self.completed {
            return false;
        }
        let event = self.workflow_event();
        self.emit("workflow_abandon", |sink| sink.on_workflow_abandon(&event));
        true
    }

    /// Jumps to a step, as a stepper click does. Hidden steps cannot be targeted.
    pub fn go_to_step(&mut self, index: usize) -> Result<Transition, NavigationError> {
        self.ensure_idle()?;
        let len = self.spec.steps.len();
        if index >= len {
            return Err(NavigationError::OutOfRange { index, len });
        }
        if !self.is_step_visible(index) {
            return Err(NavigationError::StepHidden(self.spec.steps[index].id.clone()));
        }
        self.transition_to(index)
    }

    /// Validates the current step, runs its hook and moves to the next visible step, submitting
    /// when there is none.
    pub fn go_next(&mut self) -> Result<Transition, NavigationError> {
        let pending = self.begin_next()?;
        let outcome = self.run_hook(&pending);
        self.complete_next(pending, outcome)
    }

    /// First half of [`go_next`](Self::go_next): validates the current step and marks the workflow
    /// as transitioning. The hook for the returned transition may then run anywhere.
    pub fn begin_next(&mut self) -> Result<PendingTransition, NavigationError> {
        self.ensure_idle()?;
        let index = self.state.current_step_index;
        let step_id = self.spec.steps[index].id.clone();
        if !self.forms[index].validate() {
            let errors = self.forms[index].errors();
            let event = ValidationErrorEvent {
                workflow_id: self.spec.id.clone(),
                step_id: step_id.clone(),
                errors: errors.values().flatten().cloned().collect(),
            };
            self.emit("validation_error", |sink| sink.on_validation_error(&event));
            tracing::debug!(step = %step_id, errors = errors.len(), "step blocked by validation");
            return Err(NavigationError::Invalid {
                step: step_id,
                errors,
            });
        }
        self.sync_all_data();
        self.stamp += 1;
        self.state.is_transitioning = true;
        Ok(PendingTransition {
            stamp: self.stamp,
            workflow_id: self.spec.id.clone(),
            step_index: index,
            step_id,
            data: self.forms[index].values(),
            all_data: self.state.all_data.clone(),
        })
    }

    /// Second half of [`go_next`](Self::go_next). A transition begun before a reset is stale and
    /// changes nothing.
    pub fn complete_next(
        &mut self,
        pending: PendingTransition,
        outcome: Result<StepMutator, HookError>,
    ) -> Result<Transition, NavigationError> {
        if pending.stamp != self.stamp
            || !self.state.is_transitioning
            || pending.step_index != self.state.current_step_index
        {
            tracing::warn!(step = %pending.step_id, "stale step transition discarded");
            return Err(NavigationError::Stale);
        }
        self.state.is_transitioning = false;
        let mutator = match outcome {
            Ok(mutator) => mutator,
            Err(err) => {
                self.report_error(Some(pending.step_index), ErrorCode::StepHookError, &err);
                return Err(NavigationError::Hook(err));
            }
        };
        self.apply_mutations(mutator);
        let event = self.step_event(pending.step_index);
        self.emit("step_complete", |sink| sink.on_step_complete(&event));
        self.advance_from(pending.step_index)
    }

    /// Moves to the previous visible step. Validation never blocks going back.
    pub fn go_previous(&mut self) -> Result<Transition, NavigationError> {
        self.ensure_idle()?;
        let previous = self
            .previous_visible(self.state.current_step_index)
            .ok_or(NavigationError::AtFirstStep)?;
        self.transition_to(previous)
    }

    /// Leaves the current step without validating it. Skipping the last visible step submits.
    pub fn skip_step(&mut self) -> Result<Transition, NavigationError> {
        self.ensure_idle()?;
        let index = self.state.current_step_index;
        if !self.can_skip() {
            return Err(NavigationError::SkipNotAllowed(self.spec.steps[index].id.clone()));
        }
        self.state
            .skipped_steps
            .insert(self.spec.steps[index].id.clone());
        let event = self.step_event(index);
        self.emit("step_skip", |sink| sink.on_step_skip(&event));
        self.advance_from(index)
    }

    pub fn submit_workflow(&mut self) -> Result<Transition, NavigationError> {
        self.ensure_idle()?;
        self.submit()
    }

    /// Restores the initial data and position. Pending transitions become stale.
    pub fn reset(&mut self) {
        self.stamp += 1;
        for (form, step) in self.forms.iter_mut().zip(&self.spec.steps) {
            form.reset_with(step_defaults(&self.initial, step));
        }
        self.rewind();
        tracing::debug!(workflow = %self.spec.id, "workflow reset");
    }

    /// Loads the snapshot stored under the persist key. Returns `Ok(false)` when there is none.
    pub fn restore(&mut self) -> Result<bool, PersistenceError> {
        let Some(storage) = self.storage.as_ref() else {
            return Ok(false);
        };
        let Some(snapshot) = storage.load(self.spec.persist_key())? else {
            return Ok(false);
        };
        if snapshot.workflow_id != self.spec.id {
            return Err(PersistenceError::WorkflowMismatch {
                found: snapshot.workflow_id,
                expected: self.spec.id.clone(),
            });
        }
        if snapshot.current_step_index >= self.spec.steps.len() {
            return Err(PersistenceError::Parse(format!(
                "step index {} out of range",
                snapshot.current_step_index
            )));
        }

        self.stamp += 1;
        for (form, step) in self.forms.iter_mut().zip(&self.spec.steps) {
            form.reset_with(step_defaults(&Value::Object(snapshot.all_data.clone()), step));
        }
        self.completed = false;
        self.state = WorkflowState {
            current_step_index: snapshot.current_step_index,
            all_data: Map::new(),
            visited_steps: snapshot.visited_steps,
            skipped_steps: snapshot.skipped_steps,
            is_submitting: false,
            is_transitioning: false,
        };
        self.sync_all_data();
        tracing::debug!(
            workflow = %self.spec.id,
            step = self.state.current_step_index,
            "workflow restored"
        );
        Ok(true)
    }

    /// Snapshot of the navigation state at the last transition boundary.
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            version: SNAPSHOT_VERSION,
            workflow_id: self.spec.id.clone(),
            current_step_index: self.state.current_step_index,
            all_data: self.state.all_data.clone(),
            visited_steps: self.state.visited_steps.clone(),
            skipped_steps: self.state.skipped_steps.clone(),
            last_saved: Utc::now(),
        }
    }

    fn rewind(&mut self) {
        let first = self.visible_steps().first().copied().unwrap_or(0);
        self.completed = false;
        self.state = WorkflowState {
            current_step_index: first,
            all_data: Map::new(),
            visited_steps: BTreeSet::new(),
            skipped_steps: BTreeSet::new(),
            is_submitting: false,
            is_transitioning: false,
        };
        if let Some(step) = self.spec.steps.get(first) {
            self.state.visited_steps.insert(step.id.clone());
        }
        self.sync_all_data();
    }

    fn ensure_idle(&self) -> Result<(), NavigationError> {
        if self.state.is_transitioning || self.state.is_submitting {
            return Err(NavigationError::Busy);
        }
        if self.spec.steps.is_empty() {
            return Err(NavigationError::OutOfRange { index: 0, len: 0 });
        }
        Ok(())
    }

    fn advance_from(&mut self, index: usize) -> Result<Transition, NavigationError> {
        match self.next_visible(index) {
            Some(next) => self.transition_to(next),
            None => self.submit(),
        }
    }

    fn transition_to(&mut self, to: usize) -> Result<Transition, NavigationError> {
        let from = self.state.current_step_index;
        self.state.is_transitioning = true;
        let result = match self.on_step_change.as_mut() {
            Some(callback) => callback(&StepChange {
                from,
                to,
                from_step: &self.spec.steps[from].id,
                to_step: &self.spec.steps[to].id,
            }),
            None => Ok(()),
        };
        self.state.is_transitioning = false;
        if let Err(err) = result {
            self.report_error(Some(from), ErrorCode::StepHookError, &err);
            return Err(NavigationError::Hook(err));
        }

        self.sync_all_data();
        self.state.current_step_index = to;
        self.state
            .visited_steps
            .insert(self.spec.steps[to].id.clone());
        tracing::debug!(workflow = %self.spec.id, from, to, "step changed");
        let event = self.step_event(to);
        self.emit("step_start", |sink| sink.on_step_start(&event));
        self.autosave();
        Ok(Transition::Moved { from, to })
    }

    fn submit(&mut self) -> Result<Transition, NavigationError> {
        self.sync_all_data();
        let payload = self.submission_payload();
        self.state.is_submitting = true;
        let result = match self.on_complete.as_mut() {
            Some(callback) => callback(&payload),
            None => Ok(()),
        };
        self.state.is_submitting = false;
        if let Err(err) = result {
            self.report_error(None, ErrorCode::StepHookError, &err);
            return Err(NavigationError::Completion(err));
        }

        self.completed = true;
        tracing::debug!(workflow = %self.spec.id, "workflow submitted");
        let event = self.workflow_event();
        self.emit("workflow_complete", |sink| sink.on_workflow_complete(&event));
        self.autosave();
        Ok(Transition::Submitted)
    }

    /// Data of the visible steps only.
    fn submission_payload(&self) -> Value {
        let data = self.data();
        let payload = self
            .spec
            .steps
            .iter()
            .enumerate()
            .filter(|(index, _)| self.step_visible_in(*index, &data))
            .filter_map(|(_, step)| {
                self.state
                    .all_data
                    .get(&step.id)
                    .map(|value| (step.id.clone(), value.clone()))
            })
            .collect();
        Value::Object(payload)
    }

    fn run_hook(&mut self, pending: &PendingTransition) -> Result<StepMutator, HookError> {
        let mut mutator = StepMutator::new();
        if let Some(hook) = self.hooks.get_mut(&pending.step_id) {
            hook.after_validation(&pending.context(), &mut mutator)?;
        }
        Ok(mutator)
    }

    fn apply_mutations(&mut self, mutator: StepMutator) {
        for mutation in mutator.mutations {
            match mutation {
                Mutation::SetValue {
                    step,
                    address,
                    value,
                } => match self.form_mut(&step) {
                    Some(form) => {
                        if let Err(err) = form.set_value(&address, value) {
                            tracing::warn!(step = %step, address = %address, error = %err, "hook write rejected");
                        }
                    }
                    None => tracing::warn!(step = %step, "hook wrote to unknown step"),
                },
                Mutation::ReplaceStep { step, data } => match self.form_mut(&step) {
                    Some(form) => form.reset_with(data),
                    None => tracing::warn!(step = %step, "hook replaced unknown step"),
                },
            }
        }
        self.sync_all_data();
    }

    fn step_visible_in(&self, index: usize, data: &Value) -> bool {
        self.spec.steps.get(index).is_some_and(|step| {
            step.conditions
                .visible
                .as_ref()
                .is_none_or(|expr| expr.evaluate(data))
        })
    }

    fn collect_data(&self) -> Map<String, Value> {
        self.spec
            .steps
            .iter()
            .zip(&self.forms)
            .map(|(step, form)| (step.id.clone(), form.values()))
            .collect()
    }

    fn sync_all_data(&mut self) {
        self.state.all_data = self.collect_data();
    }

    fn autosave(&mut self) {
        if !self.spec.autosave() {
            return;
        }
        let snapshot = self.snapshot();
        let Some(storage) = self.storage.as_mut() else {
            return;
        };
        if let Err(err) = storage.save(self.spec.persist_key(), &snapshot) {
            tracing::warn!(workflow = %self.spec.id, error = %err, "autosave failed; continuing");
            self.report_error(None, ErrorCode::PersistenceError, &err);
        }
    }

    fn report_error(&mut self, step: Option<usize>, code: ErrorCode, err: &dyn fmt::Display) {
        let event = ErrorEvent {
            workflow_id: self.spec.id.clone(),
            step_id: step
                .and_then(|index| self.spec.steps.get(index))
                .map(|step| step.id.clone()),
            code,
            message: err.to_string(),
        };
        self.emit("error", |sink| sink.on_error(&event));
    }

    fn workflow_event(&self) -> WorkflowEvent {
        WorkflowEvent {
            workflow_id: self.spec.id.clone(),
            step_count: self.spec.steps.len(),
            current_step: self
                .current_step()
                .map(|step| step.id.clone())
                .unwrap_or_default(),
        }
    }

    fn step_event(&self, index: usize) -> StepEvent {
        StepEvent {
            workflow_id: self.spec.id.clone(),
            step_id: self.spec.steps[index].id.clone(),
            step_index: index,
        }
    }

    fn emit<F>(&mut self, event: &'static str, send: F)
    where
        F: FnOnce(&mut dyn AnalyticsSink) -> Result<(), SinkError>,
    {
        if let Some(sink) = self.analytics.as_deref_mut()
            && let Err(err) = send(sink)
        {
            tracing::warn!(event, error = %err, "analytics sink failed; ignoring");
        }
    }
}

fn step_defaults(data: &Value, step: &StepSpec) -> Value {
    data.get(&step.id)
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::when;
    use crate::spec::field::{FieldSpec, FieldType};
    use serde_json::json;

    fn three_steps() -> WorkflowSpec {
        WorkflowSpec::new(
            "signup",
            vec![
                StepSpec::new("account")
                    .with_field(FieldSpec::new("email", FieldType::String).required()),
                StepSpec::new("profile")
                    .with_field(FieldSpec::new("nickname", FieldType::String))
                    .skippable(),
                StepSpec::new("confirm"),
            ],
        )
    }

    #[test]
    fn invalid_step_blocks_forward_but_not_backward() {
        let mut flow = Workflow::new(three_steps());
        assert!(matches!(flow.go_next(), Err(NavigationError::Invalid { .. })));
        assert_eq!(flow.current_step_index(), 0);

        flow.current_form_mut()
            .unwrap()
            .set_value("email", json!("me@example.com"))
            .unwrap();
        assert_eq!(flow.go_next().unwrap(), Transition::Moved { from: 0, to: 1 });
        assert_eq!(flow.go_previous().unwrap(), Transition::Moved { from: 1, to: 0 });
        assert!(matches!(flow.go_previous(), Err(NavigationError::AtFirstStep)));
    }

    #[test]
    fn out_of_range_jump_is_rejected() {
        let mut flow = Workflow::new(three_steps());
        assert!(matches!(
            flow.go_to_step(3),
            Err(NavigationError::OutOfRange { index: 3, len: 3 })
        ));
        assert!(!flow.state().is_transitioning);
    }

    #[test]
    fn skip_requires_permission() {
        let mut flow = Workflow::new(three_steps());
        assert!(matches!(flow.skip_step(), Err(NavigationError::SkipNotAllowed(_))));
        flow.go_to_step(1).unwrap();
        assert_eq!(flow.skip_step().unwrap(), Transition::Moved { from: 1, to: 2 });
        assert!(flow.state().skipped_steps.contains("profile"));
    }

    #[test]
    fn busy_while_transition_pending() {
        let mut flow = Workflow::with_data(
            three_steps(),
            json!({ "account": { "email": "me@example.com" } }),
        );
        let pending = flow.begin_next().unwrap();
        assert!(matches!(flow.go_previous(), Err(NavigationError::Busy)));
        assert!(matches!(flow.go_next(), Err(NavigationError::Busy)));
        flow.complete_next(pending, Ok(StepMutator::new())).unwrap();
        assert_eq!(flow.current_step_index(), 1);
    }

    #[test]
    fn failing_change_callback_does_not_leave_flow_stuck() {
        let mut flow = Workflow::new(three_steps())
            .on_step_change(|_change: &StepChange<'_>| Err(HookError::new("blocked")));
        assert!(matches!(flow.go_to_step(2), Err(NavigationError::Hook(_))));
        assert!(!flow.state().is_transitioning);
        assert_eq!(flow.current_step_index(), 0);
    }

    #[test]
    fn hidden_steps_cannot_be_targeted() {
        let spec = WorkflowSpec::new(
            "flow",
            vec![
                StepSpec::new("start").with_field(FieldSpec::new("extra", FieldType::Boolean)),
                StepSpec::new("details").visible_when(when("start.extra").equals(true)),
                StepSpec::new("end"),
            ],
        );
        let mut flow = Workflow::new(spec);
        assert_eq!(flow.visible_steps(), vec![0, 2]);
        assert!(matches!(flow.go_to_step(1), Err(NavigationError::StepHidden(_))));
        flow.current_form_mut().unwrap().set_value("extra", json!(true)).unwrap();
        assert_eq!(flow.visible_steps(), vec![0, 1, 2]);
    }

    #[test]
    fn workflow_without_steps_rejects_navigation() {
        let mut flow = Workflow::new(WorkflowSpec::new("empty", vec![]));
        flow.start();
        assert!(flow.current_step().is_none());
        assert!(flow.current_form().is_none());
        assert!(!flow.can_skip());
        assert!(flow.visible_steps().is_empty());

        let empty = |result: Result<Transition, NavigationError>| {
            matches!(result, Err(NavigationError::OutOfRange { index: 0, len: 0 }))
        };
        assert!(empty(flow.go_next()));
        assert!(empty(flow.skip_step()));
        assert!(empty(flow.go_previous()));
        assert!(empty(flow.go_to_step(0)));
        assert!(empty(flow.submit_workflow()));
        assert!(!flow.is_complete());
        assert!(flow.abandon());
    }
}
