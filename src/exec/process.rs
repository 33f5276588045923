/// Child process launch with a wall-clock limit.
///
/// The child leads its own process group so a timeout kill reaches anything it
/// spawned. Output is drained concurrently through the bounded collector.
use crate::config::types::{EngineError, Result};
use crate::utils::output::{OutputCollector, OutputLimits, OutputResult};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One program invocation: executable, arguments and working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Human-readable command line for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How the child ended, as reported by wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitOutcome {
    pub exit_code: Option<i32>,
    pub terminating_signal: Option<i32>,
}

impl WaitOutcome {
    fn from_status(status: ExitStatus) -> Self {
        Self {
            exit_code: status.code(),
            terminating_signal: status.signal(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Everything observed about one finished (or killed) child
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    pub wait: WaitOutcome,
    pub timed_out: bool,
    pub output: OutputResult,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.wait.success()
    }
}

/// Run `spec` to completion or until `limit` elapses, whichever comes first
pub fn run_with_timeout(
    spec: &CommandSpec,
    limit: Duration,
    output_limits: &OutputLimits,
) -> Result<ProcessOutcome> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);

    log::debug!("Spawning '{}' (limit {:?})", spec.display(), limit);

    let started = Instant::now();
    let mut child = command
        .spawn()
        .map_err(|e| EngineError::Process(format!("Failed to start '{}': {}", spec.program, e)))?;

    let collector = OutputCollector::start(
        output_limits.clone(),
        child.stdout.take(),
        child.stderr.take(),
    );

    let deadline = started + limit;
    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                let now = Instant::now();
                if now >= deadline {
                    timed_out = true;
                    kill_process_group(&mut child);
                    break child.wait().ok();
                }
                thread::sleep(WAIT_POLL_INTERVAL.min(deadline - now));
            }
            Err(e) => {
                kill_process_group(&mut child);
                let _ = child.wait();
                let _ = collector.finish();
                return Err(EngineError::Process(format!(
                    "Failed to wait for '{}': {}",
                    spec.program, e
                )));
            }
        }
    };
    let elapsed = started.elapsed();

    // Reap background descendants too, so nothing outlives the execution
    if !timed_out {
        kill_process_group(&mut child);
    }

    let output = collector.finish();

    Ok(ProcessOutcome {
        wait: status.map(WaitOutcome::from_status).unwrap_or_default(),
        timed_out,
        output,
        elapsed,
    })
}

/// SIGKILL the child's whole group, falling back to the child alone
fn kill_process_group(child: &mut Child) {
    let pgid = Pid::from_raw(child.id() as i32);
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => {
            log::warn!("killpg({}) failed: {}, killing child only", pgid, e);
            let _ = child.kill();
        }
    }
}
