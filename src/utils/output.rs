/// Bounded collection of child process output.
///
/// Each stream is drained on its own thread so a chatty child can never block on
/// a full pipe. Bytes past the per-stream limit are read and discarded, and the
/// stream is marked truncated.
use crate::config::types::OutputIntegrity;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Read};
use std::process::{ChildStderr, ChildStdout};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Output limits configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputLimits {
    /// Per-stream stdout limit (bytes)
    pub stdout_limit: usize,
    /// Per-stream stderr limit (bytes)
    pub stderr_limit: usize,
    /// How long to wait for readers after the child is gone (milliseconds)
    pub collection_grace_ms: u64,
}

impl Default for OutputLimits {
    fn default() -> Self {
        OutputLimits {
            stdout_limit: 1024 * 1024,   // 1 MB stdout
            stderr_limit: 256 * 1024,    // 256 KB stderr
            collection_grace_ms: 1000,
        }
    }
}

/// Output collection result
#[derive(Debug, Clone, Default)]
pub struct OutputResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_integrity: OutputIntegrity,
    pub stderr_integrity: OutputIntegrity,
}

impl OutputResult {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn truncated(&self) -> bool {
        self.stdout_integrity == OutputIntegrity::TruncatedByLimit
            || self.stderr_integrity == OutputIntegrity::TruncatedByLimit
    }
}

type StreamReport = (Vec<u8>, OutputIntegrity);

struct StreamReader {
    handle: JoinHandle<()>,
    rx: Receiver<StreamReport>,
}

/// In-flight collector for one child's stdout and stderr
pub struct OutputCollector {
    limits: OutputLimits,
    stdout: Option<StreamReader>,
    stderr: Option<StreamReader>,
}

impl OutputCollector {
    /// Start draining both streams immediately
    pub fn start(
        limits: OutputLimits,
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
    ) -> Self {
        let stdout = stdout.map(|s| spawn_reader(s, limits.stdout_limit));
        let stderr = stderr.map(|s| spawn_reader(s, limits.stderr_limit));
        OutputCollector {
            limits,
            stdout,
            stderr,
        }
    }

    /// Wait for both readers. Call once the child has exited or been killed.
    ///
    /// A reader that does not finish within the grace period (a leaked
    /// descendant still holding the pipe) is abandoned and its stream marked
    /// truncated.
    pub fn finish(self) -> OutputResult {
        let deadline = Instant::now() + Duration::from_millis(self.limits.collection_grace_ms);

        let (stdout, stdout_integrity) = wait_reader(self.stdout, deadline);
        let (stderr, stderr_integrity) = wait_reader(self.stderr, deadline);

        OutputResult {
            stdout,
            stderr,
            stdout_integrity,
            stderr_integrity,
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(stream: R, limit: usize) -> StreamReader {
    let (tx, rx) = channel();
    let handle = thread::spawn(move || collect_stream(stream, limit, tx));
    StreamReader { handle, rx }
}

fn wait_reader(reader: Option<StreamReader>, deadline: Instant) -> StreamReport {
    let Some(reader) = reader else {
        return (Vec::new(), OutputIntegrity::Complete);
    };

    let remaining = deadline.saturating_duration_since(Instant::now());
    match reader.rx.recv_timeout(remaining) {
        Ok(report) => {
            let _ = reader.handle.join();
            report
        }
        Err(RecvTimeoutError::Timeout) => {
            log::warn!("Output reader did not finish within grace period, abandoning it");
            (Vec::new(), OutputIntegrity::TruncatedByLimit)
        }
        Err(RecvTimeoutError::Disconnected) => (Vec::new(), OutputIntegrity::ReadError),
    }
}

/// Collect from a single stream, keeping at most `limit` bytes
fn collect_stream<R: Read>(stream: R, limit: usize, tx: Sender<StreamReport>) {
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut integrity = OutputIntegrity::Complete;

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(buffer.len());
                if n > room {
                    buffer.extend_from_slice(&chunk[..room]);
                    integrity = OutputIntegrity::TruncatedByLimit;
                } else {
                    buffer.extend_from_slice(&chunk[..n]);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::debug!("Output stream read failed: {}", e);
                if integrity == OutputIntegrity::Complete {
                    integrity = OutputIntegrity::ReadError;
                }
                break;
            }
        }
    }

    let _ = tx.send((buffer, integrity));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(data: &[u8], limit: usize) -> StreamReport {
        let (tx, rx) = channel();
        collect_stream(Cursor::new(data.to_vec()), limit, tx);
        rx.recv().unwrap()
    }

    #[test]
    fn test_output_limits_default() {
        let limits = OutputLimits::default();
        assert_eq!(limits.stdout_limit, 1024 * 1024);
        assert_eq!(limits.stderr_limit, 256 * 1024);
    }

    #[test]
    fn test_small_stream_is_complete() {
        let (data, integrity) = collect(b"hello\nworld\n", 64);
        assert_eq!(data, b"hello\nworld\n");
        assert_eq!(integrity, OutputIntegrity::Complete);
    }

    #[test]
    fn test_stream_past_limit_is_truncated_and_drained() {
        let input = vec![b'x'; 20_000];
        let (data, integrity) = collect(&input, 100);
        assert_eq!(data.len(), 100);
        assert_eq!(integrity, OutputIntegrity::TruncatedByLimit);
    }

    #[test]
    fn test_collector_without_streams() {
        let collector = OutputCollector::start(OutputLimits::default(), None, None);
        let result = collector.finish();
        assert!(result.stdout.is_empty());
        assert!(result.stderr.is_empty());
        assert!(!result.truncated());
    }

    #[test]
    fn test_output_integrity_display() {
        assert_eq!(format!("{}", OutputIntegrity::Complete), "complete");
        assert_eq!(format!("{}", OutputIntegrity::TruncatedByLimit), "truncated_by_limit");
    }
}
