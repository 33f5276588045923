use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wall-clock deadline shared with the engine's interrupt hook.
///
/// The hook runs inside the interpreter loop, so a synchronous infinite loop
/// is aborted as soon as the deadline passes. Re-arming moves the deadline
/// for the next phase (drain, rendering).
#[derive(Clone, Debug)]
pub struct Watchdog {
    origin: Instant,
    deadline_ms: Arc<AtomicU64>,
    tripped: Arc<AtomicBool>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            deadline_ms: Arc::new(AtomicU64::new(u64::MAX)),
            tripped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start a new phase with `budget` from now, clearing any previous trip
    pub fn arm(&self, budget: Duration) {
        let deadline = self.elapsed_ms().saturating_add(budget.as_millis() as u64);
        self.deadline_ms.store(deadline, Ordering::SeqCst);
        self.tripped.store(false, Ordering::SeqCst);
    }

    pub fn expired(&self) -> bool {
        self.elapsed_ms() >= self.deadline_ms.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> Duration {
        let deadline = self.deadline_ms.load(Ordering::SeqCst);
        Duration::from_millis(deadline.saturating_sub(self.elapsed_ms()))
    }

    /// Whether the hook aborted script code in the current phase
    pub fn tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Hook for `Runtime::set_interrupt_handler`
    pub fn interrupt_handler(&self) -> Box<dyn FnMut() -> bool + Send + 'static> {
        let watchdog = self.clone();
        Box::new(move || {
            if watchdog.expired() {
                watchdog.tripped.store(true, Ordering::SeqCst);
                true
            } else {
                false
            }
        })
    }

    fn elapsed_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}
