/// Subprocess runner: the compile, run and cleanup flow shared by every
/// external back-end.
use crate::config::config::{EngineConfig, ToolchainConfig};
use crate::config::types::{EngineError, ExecutionResult, Result};
use crate::engine::language::Language;
use crate::exec::process::{self, ProcessOutcome};
use crate::judge::{adapter_for, RunWorkspace};
use crate::observability::audit;
use crate::safety::workspace::ScratchRoot;
use crate::utils::output::{OutputLimits, OutputResult};
use crate::verdict::verdict::{Phase, VerdictClassifier, COMPILE_ERROR_PREFIX};
use std::time::Duration;
use uuid::Uuid;

pub const STDERR_PREFIX: &str = "STDERR: ";
pub const TRUNCATION_MARKER: &str = "[output truncated]";

pub struct SubprocessRunner {
    scratch: ScratchRoot,
    toolchain: ToolchainConfig,
    timeout: Duration,
    compile_timeout: Duration,
    output_limits: OutputLimits,
}

impl SubprocessRunner {
    pub fn new(config: &EngineConfig, scratch: ScratchRoot) -> Self {
        Self {
            scratch,
            toolchain: config.toolchain.clone(),
            timeout: config.timeout(),
            compile_timeout: config.compile_timeout(),
            output_limits: config.output.clone(),
        }
    }

    pub fn scratch(&self) -> &ScratchRoot {
        &self.scratch
    }

    /// Run `code` as a program in `language`. Never fails: every error becomes
    /// a failed result, and the workspace is gone before this returns.
    pub fn run_external(&self, id: Uuid, language: Language, code: &str) -> ExecutionResult {
        match self.try_run(id, language, code) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Execution {} ({}) failed before completion: {}", id, language, e);
                ExecutionResult::failed(id, e.to_string(), Vec::new())
            }
        }
    }

    fn try_run(&self, id: Uuid, language: Language, code: &str) -> Result<ExecutionResult> {
        let adapter = adapter_for(language, &self.toolchain)?;
        let mut workspace = self.scratch.create_workspace(id)?;

        let source = workspace.write_source(&adapter.source_file_name(id, code), code)?;
        let artifact = adapter
            .artifact_file_name(id)
            .map(|name| workspace.artifact_path(&name));
        let run_workspace = RunWorkspace {
            workdir: workspace.dir().to_path_buf(),
            source,
            artifact,
        };

        if let Some(compile) = adapter.compile_command(&run_workspace) {
            let outcome =
                match process::run_with_timeout(&compile, self.compile_timeout, &self.output_limits) {
                    Ok(outcome) => outcome,
                    Err(EngineError::Process(msg)) => {
                        workspace.cleanup();
                        return Ok(ExecutionResult::failed(
                            id,
                            format!("{}{}", COMPILE_ERROR_PREFIX, msg),
                            Vec::new(),
                        ));
                    }
                    Err(e) => return Err(e),
                };

            let verdict = VerdictClassifier::classify(Phase::Compile, &outcome, self.compile_timeout);
            if !verdict.is_ok() {
                if outcome.timed_out {
                    audit::timed_out(id, language.as_str(), "compile", self.compile_timeout);
                }
                audit::compile_failed(id, language.as_str(), outcome.output.stderr.len());
                // The run phase is never attempted
                workspace.cleanup();
                return Ok(ExecutionResult::failed(
                    id,
                    verdict.message.unwrap_or_else(|| COMPILE_ERROR_PREFIX.trim().to_string()),
                    Vec::new(),
                ));
            }
            log::debug!("Execution {} compiled in {:?}", id, outcome.elapsed);
        }

        let run = adapter.run_command(&run_workspace);
        let outcome = process::run_with_timeout(&run, self.timeout, &self.output_limits);
        workspace.cleanup();
        let outcome = outcome?;

        Ok(self.finish_run(id, language, &outcome))
    }

    fn finish_run(&self, id: Uuid, language: Language, outcome: &ProcessOutcome) -> ExecutionResult {
        let logs = collect_logs(&outcome.output);
        let verdict = VerdictClassifier::classify(Phase::Run, outcome, self.timeout);

        if outcome.timed_out {
            audit::timed_out(id, language.as_str(), "run", self.timeout);
        }

        match verdict.message {
            None => ExecutionResult::succeeded(id, None, logs),
            Some(message) => ExecutionResult::failed(id, message, logs),
        }
    }
}

/// Stdout lines, then stderr as one tagged entry, then a truncation marker
/// if either stream hit its limit.
pub fn collect_logs(output: &OutputResult) -> Vec<String> {
    let mut logs = Vec::new();

    let stdout = output.stdout_text();
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        logs.extend(stdout.split('\n').map(str::to_string));
    }

    let stderr = output.stderr_text();
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        logs.push(format!("{}{}", STDERR_PREFIX, stderr));
    }

    if output.truncated() {
        logs.push(TRUNCATION_MARKER.to_string());
    }

    logs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::OutputIntegrity;

    fn output(stdout: &str, stderr: &str) -> OutputResult {
        OutputResult {
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            ..OutputResult::default()
        }
    }

    #[test]
    fn test_logs_split_trimmed_stdout() {
        let logs = collect_logs(&output("\n1\n2\n\n", ""));
        assert_eq!(logs, ["1", "2"]);
    }

    #[test]
    fn test_interior_blank_lines_survive() {
        let logs = collect_logs(&output("a\n\nb\n", ""));
        assert_eq!(logs, ["a", "", "b"]);
    }

    #[test]
    fn test_stderr_is_one_tagged_entry() {
        let logs = collect_logs(&output("ok\n", "warn 1\nwarn 2\n"));
        assert_eq!(logs, ["ok", "STDERR: warn 1\nwarn 2"]);
    }

    #[test]
    fn test_empty_output_has_no_logs() {
        assert!(collect_logs(&output("", "  \n")).is_empty());
    }

    #[test]
    fn test_truncation_marker_is_last() {
        let mut out = output("x\n", "");
        out.stdout_integrity = OutputIntegrity::TruncatedByLimit;
        assert_eq!(collect_logs(&out), ["x", TRUNCATION_MARKER]);
    }
}
