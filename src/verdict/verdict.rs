/// Verdict classification for subprocess phases.
///
/// A pure function over the observed [`ProcessOutcome`]: timeouts first, then
/// the wait status. The caller turns the verdict into an `ExecutionResult`.
use crate::exec::process::ProcessOutcome;
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const TIMEOUT_MESSAGE: &str = "Execution timed out";
pub const COMPILE_ERROR_PREFIX: &str = "Compilation Error: ";

/// Which step of a back-end produced the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Compile,
    Run,
}

/// Status taxonomy for subprocess executions
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "CE")]
    CompileError,
    #[serde(rename = "RE")]
    RuntimeError,
    #[serde(rename = "TLE")]
    TimeLimit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub status: ExecutionStatus,
    /// Caller-facing error text, `None` for `Ok`
    pub message: Option<String>,
}

impl Verdict {
    fn ok() -> Self {
        Self {
            status: ExecutionStatus::Ok,
            message: None,
        }
    }

    fn with_message(status: ExecutionStatus, message: String) -> Self {
        Self {
            status,
            message: Some(message),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ExecutionStatus::Ok
    }
}

pub struct VerdictClassifier;

impl VerdictClassifier {
    /// Classify one phase. `budget` is the limit the phase ran under.
    pub fn classify(phase: Phase, outcome: &ProcessOutcome, budget: Duration) -> Verdict {
        match phase {
            Phase::Compile => Self::classify_compile(outcome, budget),
            Phase::Run => Self::classify_run(outcome),
        }
    }

    fn classify_compile(outcome: &ProcessOutcome, budget: Duration) -> Verdict {
        if outcome.timed_out {
            return Verdict::with_message(
                ExecutionStatus::CompileError,
                format!(
                    "{}compiler timed out after {} ms",
                    COMPILE_ERROR_PREFIX,
                    budget.as_millis()
                ),
            );
        }
        if outcome.wait.success() {
            return Verdict::ok();
        }

        // Diagnostics verbatim; fall back to the exit description when the
        // compiler printed nothing
        let stderr = outcome.output.stderr_text();
        let detail = if stderr.trim().is_empty() {
            describe_exit(outcome)
        } else {
            stderr.trim_end().to_string()
        };
        Verdict::with_message(
            ExecutionStatus::CompileError,
            format!("{}{}", COMPILE_ERROR_PREFIX, detail),
        )
    }

    fn classify_run(outcome: &ProcessOutcome) -> Verdict {
        if outcome.timed_out {
            return Verdict::with_message(ExecutionStatus::TimeLimit, TIMEOUT_MESSAGE.to_string());
        }
        if outcome.wait.success() {
            return Verdict::ok();
        }

        let mut message = describe_exit(outcome);
        let stderr = outcome.output.stderr_text();
        if !stderr.trim().is_empty() {
            message.push('\n');
            message.push_str(stderr.trim());
        }
        Verdict::with_message(ExecutionStatus::RuntimeError, message)
    }
}

fn describe_exit(outcome: &ProcessOutcome) -> String {
    if let Some(code) = outcome.wait.exit_code {
        return format!("Process exited with code {}", code);
    }
    match outcome.wait.terminating_signal {
        Some(sig) => match Signal::try_from(sig) {
            Ok(signal) => format!("Process terminated by signal {} ({})", sig, signal.as_str()),
            Err(_) => format!("Process terminated by signal {}", sig),
        },
        None => "Process ended without an exit status".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::process::WaitOutcome;
    use crate::utils::output::OutputResult;

    fn outcome(exit_code: Option<i32>, signal: Option<i32>, stderr: &str) -> ProcessOutcome {
        ProcessOutcome {
            wait: WaitOutcome {
                exit_code,
                terminating_signal: signal,
            },
            timed_out: false,
            output: OutputResult {
                stderr: stderr.as_bytes().to_vec(),
                ..OutputResult::default()
            },
            elapsed: Duration::from_millis(5),
        }
    }

    const BUDGET: Duration = Duration::from_millis(15_000);

    #[test]
    fn test_clean_exit_is_ok() {
        let verdict = VerdictClassifier::classify(Phase::Run, &outcome(Some(0), None, ""), BUDGET);
        assert!(verdict.is_ok());
        assert!(verdict.message.is_none());
    }

    #[test]
    fn test_clean_exit_with_warnings_is_ok() {
        let verdict = VerdictClassifier::classify(
            Phase::Run,
            &outcome(Some(0), None, "DeprecationWarning: x"),
            BUDGET,
        );
        assert!(verdict.is_ok());
    }

    #[test]
    fn test_nonzero_exit_carries_stderr() {
        let verdict = VerdictClassifier::classify(
            Phase::Run,
            &outcome(Some(1), None, "Traceback...\nZeroDivisionError\n"),
            BUDGET,
        );
        assert_eq!(verdict.status, ExecutionStatus::RuntimeError);
        assert_eq!(
            verdict.message.as_deref(),
            Some("Process exited with code 1\nTraceback...\nZeroDivisionError")
        );
    }

    #[test]
    fn test_signal_is_named() {
        let verdict = VerdictClassifier::classify(Phase::Run, &outcome(None, Some(11), ""), BUDGET);
        assert_eq!(verdict.status, ExecutionStatus::RuntimeError);
        assert_eq!(
            verdict.message.as_deref(),
            Some("Process terminated by signal 11 (SIGSEGV)")
        );
    }

    #[test]
    fn test_run_timeout_has_fixed_message() {
        let mut timed_out = outcome(None, Some(9), "");
        timed_out.timed_out = true;
        let verdict = VerdictClassifier::classify(Phase::Run, &timed_out, BUDGET);
        assert_eq!(verdict.status, ExecutionStatus::TimeLimit);
        assert_eq!(verdict.message.as_deref(), Some(TIMEOUT_MESSAGE));
    }

    #[test]
    fn test_compile_failure_uses_diagnostics() {
        let verdict = VerdictClassifier::classify(
            Phase::Compile,
            &outcome(Some(1), None, "main.c:1:10: error: expected ';'\n"),
            BUDGET,
        );
        assert_eq!(verdict.status, ExecutionStatus::CompileError);
        assert_eq!(
            verdict.message.as_deref(),
            Some("Compilation Error: main.c:1:10: error: expected ';'")
        );
    }

    #[test]
    fn test_silent_compile_failure_uses_exit() {
        let verdict =
            VerdictClassifier::classify(Phase::Compile, &outcome(Some(4), None, ""), BUDGET);
        assert_eq!(
            verdict.message.as_deref(),
            Some("Compilation Error: Process exited with code 4")
        );
    }

    #[test]
    fn test_compile_timeout() {
        let mut timed_out = outcome(None, Some(9), "");
        timed_out.timed_out = true;
        let verdict = VerdictClassifier::classify(Phase::Compile, &timed_out, BUDGET);
        assert_eq!(verdict.status, ExecutionStatus::CompileError);
        assert_eq!(
            verdict.message.as_deref(),
            Some("Compilation Error: compiler timed out after 15000 ms")
        );
    }
}
