/// Structured execution audit events.
///
/// Every event is one JSON line on the `execbox::audit` log target, correlated
/// by execution id. Submitted source is never logged, only its SHA-256
/// fingerprint. An optional append-only audit file receives the same lines.
use crate::config::types::{EngineError, Result};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use uuid::Uuid;

pub const AUDIT_TARGET: &str = "execbox::audit";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditSeverity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ExecutionStart,
    ExecutionEnd,
    UnsupportedLanguage,
    CompileFailure,
    Timeout,
    CleanupFailure,
}

impl AuditEventType {
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::ExecutionStart | AuditEventType::ExecutionEnd => AuditSeverity::Low,
            AuditEventType::UnsupportedLanguage | AuditEventType::CompileFailure => {
                AuditSeverity::Low
            }
            AuditEventType::Timeout => AuditSeverity::Medium,
            AuditEventType::CleanupFailure => AuditSeverity::High,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub execution_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, execution_id: Uuid) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            severity: event_type.default_severity(),
            execution_id,
            language: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"event_type":"{:?}","execution_id":"{}","serialize_error":"{}"}}"#,
                self.event_type, self.execution_id, e
            )
        })
    }
}

static AUDIT_FILE: OnceLock<Mutex<File>> = OnceLock::new();

/// Mirror audit events into an append-only file. Only the first call wins.
pub fn init_audit_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            EngineError::Config(format!("Failed to create audit log directory: {}", e))
        })?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| EngineError::Config(format!("Failed to open audit log: {}", e)))?;

    if AUDIT_FILE.set(Mutex::new(file)).is_err() {
        warn!("Audit file already initialized, ignoring {}", path.display());
    }
    Ok(())
}

pub fn emit(event: &AuditEvent) {
    let line = event.to_json_line();
    match event.severity {
        AuditSeverity::High => error!(target: AUDIT_TARGET, "{}", line),
        AuditSeverity::Medium => warn!(target: AUDIT_TARGET, "{}", line),
        AuditSeverity::Low => info!(target: AUDIT_TARGET, "{}", line),
    }

    if let Some(audit_file) = AUDIT_FILE.get() {
        match audit_file.lock() {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", line) {
                    error!("Failed to write audit log: {}", e);
                }
            }
            Err(_) => error!("Audit file lock poisoned"),
        }
    }
}

/// SHA-256 of the submitted source, hex encoded
pub fn source_fingerprint(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn execution_started(id: Uuid, language: &str, code: &str) {
    emit(
        &AuditEvent::new(AuditEventType::ExecutionStart, id)
            .with_language(language)
            .with_details(serde_json::json!({
                "source_sha256": source_fingerprint(code),
                "source_bytes": code.len(),
            })),
    );
}

pub fn execution_finished(id: Uuid, language: &str, success: bool, elapsed: Duration) {
    emit(
        &AuditEvent::new(AuditEventType::ExecutionEnd, id)
            .with_language(language)
            .with_details(serde_json::json!({
                "success": success,
                "elapsed_ms": elapsed.as_millis() as u64,
            })),
    );
}

pub fn unsupported_language(id: Uuid, tag: &str) {
    emit(
        &AuditEvent::new(AuditEventType::UnsupportedLanguage, id)
            .with_details(serde_json::json!({ "tag": tag })),
    );
}

pub fn compile_failed(id: Uuid, language: &str, diagnostic_bytes: usize) {
    emit(
        &AuditEvent::new(AuditEventType::CompileFailure, id)
            .with_language(language)
            .with_details(serde_json::json!({ "diagnostic_bytes": diagnostic_bytes })),
    );
}

pub fn timed_out(id: Uuid, language: &str, phase: &str, budget: Duration) {
    emit(
        &AuditEvent::new(AuditEventType::Timeout, id)
            .with_language(language)
            .with_details(serde_json::json!({
                "phase": phase,
                "budget_ms": budget.as_millis() as u64,
            })),
    );
}

pub fn cleanup_failed(id: Uuid, path: &Path, reason: &str) {
    emit(
        &AuditEvent::new(AuditEventType::CleanupFailure, id).with_details(serde_json::json!({
            "path": path.display().to_string(),
            "reason": reason,
        })),
    );
}
