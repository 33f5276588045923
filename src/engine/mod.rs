//! Dispatcher: the single `execute(code, language)` entry point.
//!
//! A language tag is normalized to a [`Language`], then exactly one runner
//! handles the call. Unknown tags fail before anything is allocated.

pub mod language;

pub use language::Language;

use crate::config::config::EngineConfig;
use crate::config::types::{ExecutionResult, Result};
use crate::config::validator::validate_config;
use crate::exec::subprocess::SubprocessRunner;
use crate::observability::audit;
use crate::safety::workspace::ScratchRoot;
use crate::sandbox::{ContextExtensions, SandboxRunner};
use std::time::Instant;
use uuid::Uuid;

pub struct Engine {
    sandbox: SandboxRunner,
    subprocess: SubprocessRunner,
}

impl Engine {
    /// Validate `config`, open the scratch root and the audit file if one is
    /// configured. Config warnings are logged.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let validation = validate_config(&config)?;
        for warning in &validation.warnings {
            log::warn!("Config warning: {}", warning);
        }

        if let Some(path) = &config.audit_file {
            audit::init_audit_file(path)?;
        }

        let scratch = ScratchRoot::open(config.scratch_dir())?;
        log::info!(
            "Engine ready: timeout {}ms, scratch root {}",
            config.timeout_ms,
            scratch.path().display()
        );

        Ok(Self {
            sandbox: SandboxRunner::new(&config),
            subprocess: SubprocessRunner::new(&config, scratch),
        })
    }

    pub fn scratch(&self) -> &ScratchRoot {
        self.subprocess.scratch()
    }

    /// Run `code` in the language named by `language`. Never fails: an
    /// unknown tag yields `Unsupported language: <tag>` without running anything.
    pub fn execute(&self, code: &str, language: &str, extensions: &ContextExtensions) -> ExecutionResult {
        match language.parse::<Language>() {
            Ok(language) => self.execute_language(code, language, extensions),
            Err(e) => {
                let id = Uuid::new_v4();
                audit::unsupported_language(id, language);
                ExecutionResult::failed(id, e.to_string(), Vec::new())
            }
        }
    }

    pub fn execute_language(
        &self,
        code: &str,
        language: Language,
        extensions: &ContextExtensions,
    ) -> ExecutionResult {
        let id = Uuid::new_v4();
        let started = Instant::now();
        audit::execution_started(id, language.as_str(), code);

        let result = if language.is_in_process() {
            self.sandbox.run(id, code, extensions)
        } else {
            if !extensions.is_empty() {
                log::debug!(
                    "Execution {}: {} context extension(s) ignored for {}",
                    id,
                    extensions.len(),
                    language
                );
            }
            self.subprocess.run_external(id, language, code)
        };

        audit::execution_finished(id, language.as_str(), result.success(), started.elapsed());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> Engine {
        let config = EngineConfig {
            scratch_dir: Some(dir.path().to_path_buf()),
            ..EngineConfig::default()
        };
        Engine::new(config).unwrap()
    }

    #[test]
    fn test_unknown_language_allocates_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        let result = engine.execute("print(1)", "brainfuck", &ContextExtensions::new());
        assert!(!result.success());
        assert_eq!(result.error(), Some("Unsupported language: brainfuck"));
        assert_eq!(result.result(), None);
        assert!(result.logs().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_aliases_reach_the_sandbox() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        for tag in ["javascript", "JS", "script", " node "] {
            let result = engine.execute("40 + 2", tag, &ContextExtensions::new());
            assert!(result.success(), "tag {}", tag);
            assert_eq!(result.result(), Some("42"));
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig {
            timeout_ms: 0,
            ..EngineConfig::default()
        };
        assert!(Engine::new(config).is_err());
    }

    #[test]
    fn test_each_call_gets_a_fresh_id() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let a = engine.execute("1", "js", &ContextExtensions::new());
        let b = engine.execute("1", "js", &ContextExtensions::new());
        assert_ne!(a.id(), b.id());
    }
}
