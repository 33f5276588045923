use crate::sandbox::console::LogBuffer;
use crate::sandbox::watchdog::Watchdog;
use crate::serializer;
use rquickjs::function::{Opt, Rest};
use rquickjs::{CatchResultExt, CaughtError, Ctx, Function, Object, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

const MIN_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Timeout,
    Interval,
}

impl TimerKind {
    fn api_name(&self) -> &'static str {
        match self {
            TimerKind::Timeout => "setTimeout",
            TimerKind::Interval => "setInterval",
        }
    }
}

struct TimerEntry<'js> {
    id: u32,
    seq: u64,
    due: Instant,
    kind: TimerKind,
    period: Duration,
    callback: Value<'js>,
    args: Vec<Value<'js>>,
}

struct TimerState<'js> {
    next_id: u32,
    next_seq: u64,
    entries: Vec<TimerEntry<'js>>,
    /// Scheduled timeouts whose callback has not finished. Intervals never count.
    outstanding: usize,
}

/// Per-execution timer table driven by the runner's event loop.
///
/// Holds script values, so it must be [`cleared`](TimerQueue::clear_all) before
/// the context it was created in goes away.
#[derive(Clone)]
pub struct TimerQueue<'js> {
    state: Rc<RefCell<TimerState<'js>>>,
    logs: LogBuffer,
    depth: i32,
}

impl<'js> TimerQueue<'js> {
    pub fn new(logs: LogBuffer, depth: i32) -> Self {
        Self {
            state: Rc::new(RefCell::new(TimerState {
                next_id: 1,
                next_seq: 0,
                entries: Vec::new(),
                outstanding: 0,
            })),
            logs,
            depth,
        }
    }

    pub fn outstanding(&self) -> usize {
        self.state.borrow().outstanding
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().entries.is_empty()
    }

    /// When the earliest pending timer is due
    pub fn next_due(&self) -> Option<Instant> {
        self.state.borrow().entries.iter().map(|e| e.due).min()
    }

    pub fn schedule(
        &self,
        kind: TimerKind,
        callback: Value<'js>,
        delay: Duration,
        args: Vec<Value<'js>>,
    ) -> u32 {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1).max(1);
        let seq = state.next_seq;
        state.next_seq += 1;

        let period = delay.max(MIN_DELAY);
        state.entries.push(TimerEntry {
            id,
            seq,
            due: Instant::now() + period,
            kind,
            period,
            callback,
            args,
        });
        if kind == TimerKind::Timeout {
            state.outstanding += 1;
        }
        id
    }

    /// Cancel a pending timer. A cancelled timeout no longer counts as outstanding.
    pub fn clear(&self, id: u32) {
        let mut state = self.state.borrow_mut();
        if let Some(pos) = state.entries.iter().position(|e| e.id == id) {
            let entry = state.entries.remove(pos);
            if entry.kind == TimerKind::Timeout {
                state.outstanding = state.outstanding.saturating_sub(1);
            }
        }
    }

    /// Drop every timer and the script values they hold
    pub fn clear_all(&self) {
        let mut state = self.state.borrow_mut();
        state.entries.clear();
        state.outstanding = 0;
    }

    /// Run every timer due now, earliest first, with microtasks flushed after
    /// each callback. Returns whether anything fired.
    pub fn fire_due(&self, ctx: &Ctx<'js>, watchdog: &Watchdog) -> bool {
        let now = Instant::now();
        let mut fired = false;

        while !watchdog.expired() {
            let Some(entry) = self.pop_due(now) else {
                break;
            };
            fired = true;

            // Intervals go back in before running so the callback can clear them
            if entry.kind == TimerKind::Interval {
                self.reschedule(&entry);
            }

            self.invoke(ctx, &entry);

            if entry.kind == TimerKind::Timeout {
                let mut state = self.state.borrow_mut();
                state.outstanding = state.outstanding.saturating_sub(1);
            }

            run_microtasks(ctx, watchdog);
        }

        fired
    }

    fn pop_due(&self, now: Instant) -> Option<TimerEntry<'js>> {
        let mut state = self.state.borrow_mut();
        let pos = state
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due <= now)
            .min_by_key(|(_, e)| (e.due, e.seq))
            .map(|(pos, _)| pos)?;
        Some(state.entries.remove(pos))
    }

    fn reschedule(&self, entry: &TimerEntry<'js>) {
        let mut state = self.state.borrow_mut();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.push(TimerEntry {
            id: entry.id,
            seq,
            due: Instant::now() + entry.period,
            kind: entry.kind,
            period: entry.period,
            callback: entry.callback.clone(),
            args: entry.args.clone(),
        });
    }

    /// Call the callback. Throws are logged, never propagated.
    fn invoke(&self, ctx: &Ctx<'js>, entry: &TimerEntry<'js>) {
        let Some(callback) = entry.callback.as_function() else {
            return;
        };

        let outcome = callback
            .call::<_, Value<'js>>((Rest(entry.args.clone()),))
            .catch(ctx);
        if let Err(caught) = outcome {
            let message = caught_message(ctx, caught, self.depth);
            self.logs.push(format!(
                "ERROR: Async Error ({}): {}",
                entry.kind.api_name(),
                message
            ));
        }
    }
}

/// Flush the microtask queue, stopping early once the watchdog expires
pub fn run_microtasks(ctx: &Ctx<'_>, watchdog: &Watchdog) {
    while !watchdog.expired() && ctx.execute_pending_job() {}
}

/// Message of a thrown error, or the thrown value rendered as text
pub fn caught_message<'js>(ctx: &Ctx<'js>, caught: CaughtError<'js>, depth: i32) -> String {
    match caught {
        CaughtError::Exception(exception) => exception
            .message()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| serializer::serialize(ctx, exception.as_value(), depth)),
        CaughtError::Value(value) => serializer::serialize(ctx, &value, depth),
        CaughtError::Error(error) => error.to_string(),
    }
}

fn delay_of(value: Option<Value<'_>>) -> Duration {
    let millis = value
        .and_then(|v| v.as_number())
        .filter(|ms| ms.is_finite() && *ms > 0.0)
        .unwrap_or(0.0);
    Duration::from_millis(millis as u64)
}

fn id_of(value: Option<Value<'_>>) -> Option<u32> {
    value
        .and_then(|v| v.as_number())
        .filter(|id| id.is_finite() && *id >= 1.0 && *id <= u32::MAX as f64)
        .map(|id| id as u32)
}

/// Install `setTimeout`, `clearTimeout`, `setInterval` and `clearInterval`
pub fn install_timers<'js>(
    ctx: &Ctx<'js>,
    globals: &Object<'js>,
    queue: &TimerQueue<'js>,
) -> rquickjs::Result<()> {
    for kind in [TimerKind::Timeout, TimerKind::Interval] {
        let timers = queue.clone();
        let schedule = Function::new(
            ctx.clone(),
            move |callback: Opt<Value<'js>>, delay: Opt<Value<'js>>, args: Rest<Value<'js>>| {
                let callback = match callback.0 {
                    Some(callback) => callback,
                    None => return 0,
                };
                timers.schedule(kind, callback, delay_of(delay.0), args.0)
            },
        )?
        .with_name(kind.api_name())?;
        globals.set(kind.api_name(), schedule)?;
    }

    for name in ["clearTimeout", "clearInterval"] {
        let timers = queue.clone();
        let clear = Function::new(ctx.clone(), move |id: Opt<Value<'js>>| {
            if let Some(id) = id_of(id.0) {
                timers.clear(id);
            }
        })?
        .with_name(name)?;
        globals.set(name, clear)?;
    }

    Ok(())
}
