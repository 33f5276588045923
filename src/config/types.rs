/// Core types shared by the dispatcher and both runners
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Outcome of one `execute` call.
///
/// Built once through [`ExecutionResult::succeeded`] or [`ExecutionResult::failed`]
/// and never mutated afterwards, so `success=true` always pairs with `error=None`
/// and `success=false` always pairs with `result=None`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    id: Uuid,
    success: bool,
    result: Option<String>,
    logs: Vec<String>,
    error: Option<String>,
}

impl ExecutionResult {
    /// Successful run. `result` is `None` for subprocess back-ends.
    pub fn succeeded(id: Uuid, result: Option<String>, logs: Vec<String>) -> Self {
        Self {
            id,
            success: true,
            result,
            logs,
            error: None,
        }
    }

    /// Failed run. Logs gathered before the failure are kept.
    pub fn failed(id: Uuid, error: impl Into<String>, logs: Vec<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            logs,
            error: Some(error.into()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Integrity of a captured output stream
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OutputIntegrity {
    #[default]
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "truncated_by_limit")]
    TruncatedByLimit,
    #[serde(rename = "read_error")]
    ReadError,
}

impl fmt::Display for OutputIntegrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputIntegrity::Complete => write!(f, "complete"),
            OutputIntegrity::TruncatedByLimit => write!(f, "truncated_by_limit"),
            OutputIntegrity::ReadError => write!(f, "read_error"),
        }
    }
}

/// Error types for the execution engine.
///
/// None of these ever reach an `execute` caller directly; runners fold them into
/// a failed [`ExecutionResult`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("{0}")]
    Script(String),

    /// The sandbox watchdog fired. Carries the budget that ran out.
    #[error("Script execution timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
