//! Fire-and-forget analytics callbacks.
//!
//! A sink reports failures through its return value; the workflow logs them and moves on.

use serde::Serialize;
use thiserror::Error;

use crate::error::{ErrorCode, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowEvent {
    pub workflow_id: String,
    pub step_count: usize,
    pub current_step: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepEvent {
    pub workflow_id: String,
    pub step_id: String,
    pub step_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationErrorEvent {
    pub workflow_id: String,
    pub step_id: String,
    pub errors: Vec<ValidationError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEvent {
    pub workflow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub code: ErrorCode,
    pub message: String,
}

/// Every callback defaults to a no-op.
pub trait AnalyticsSink {
    fn on_workflow_start(&mut self, _event: &WorkflowEvent) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_workflow_complete(&mut self, _event: &WorkflowEvent) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_workflow_abandon(&mut self, _event: &WorkflowEvent) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_step_start(&mut self, _event: &StepEvent) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_step_complete(&mut self, _event: &StepEvent) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_step_skip(&mut self, _event: &StepEvent) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_validation_error(&mut self, _event: &ValidationErrorEvent) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_error(&mut self, _event: &ErrorEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink that forwards every event to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AnalyticsSink for TracingSink {
    fn on_workflow_start(&mut self, event: &WorkflowEvent) -> Result<(), SinkError> {
        tracing::info!(workflow = %event.workflow_id, steps = event.step_count, "workflow started");
        Ok(())
    }

    fn on_workflow_complete(&mut self, event: &WorkflowEvent) -> Result<(), SinkError> {
        tracing::info!(workflow = %event.workflow_id, "workflow completed");
        Ok(())
    }

    fn on_workflow_abandon(&mut self, event: &WorkflowEvent) -> Result<(), SinkError> {
        tracing::info!(workflow = %event.workflow_id, step = %event.current_step, "workflow abandoned");
        Ok(())
    }

    fn on_step_start(&mut self, event: &StepEvent) -> Result<(), SinkError> {
        tracing::info!(workflow = %event.workflow_id, step = %event.step_id, "step started");
        Ok(())
    }

    fn on_step_complete(&mut self, event: &StepEvent) -> Result<(), SinkError> {
        tracing::info!(workflow = %event.workflow_id, step = %event.step_id, "step completed");
        Ok(())
    }

    fn on_step_skip(&mut self, event: &StepEvent) -> Result<(), SinkError> {
        tracing::info!(workflow = %event.workflow_id, step = %event.step_id, "step skipped");
        Ok(())
    }

    fn on_validation_error(&mut self, event: &ValidationErrorEvent) -> Result<(), SinkError> {
        tracing::info!(
            workflow = %event.workflow_id,
            step = %event.step_id,
            errors = event.errors.len(),
            "step validation failed"
        );
        Ok(())
    }

    fn on_error(&mut self, event: &ErrorEvent) -> Result<(), SinkError> {
        tracing::warn!(
            workflow = %event.workflow_id,
            code = %event.code,
            message = %event.message,
            "workflow error"
        );
        Ok(())
    }
}
