use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy shared by validation results, analytics events and hook failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ConstraintViolation,
    ValidationError,
    ConditionalRequired,
    RepeatableMinCount,
    RepeatableMaxCount,
    StepHookError,
    PersistenceError,
    StorageUnavailable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConstraintViolation => "CONSTRAINT_VIOLATION",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::ConditionalRequired => "CONDITIONAL_REQUIRED",
            ErrorCode::RepeatableMinCount => "REPEATABLE_MIN_COUNT",
            ErrorCode::RepeatableMaxCount => "REPEATABLE_MAX_COUNT",
            ErrorCode::StepHookError => "STEP_HOOK_ERROR",
            ErrorCode::PersistenceError => "PERSISTENCE_ERROR",
            ErrorCode::StorageUnavailable => "STORAGE_UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation failure attached to a field address or a repeatable id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationError {
    pub message: String,
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ValidationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            path: None,
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Failure raised by a step hook, a change callback or a completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HookError {
    pub message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
