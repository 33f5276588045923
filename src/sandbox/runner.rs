use crate::config::config::{EngineConfig, SandboxLimits};
use crate::config::types::{EngineError, ExecutionResult, Result};
use crate::engine::language::Language;
use crate::observability::audit;
use crate::sandbox::console::LogBuffer;
use crate::sandbox::globals::{install_extensions, install_globals};
use crate::sandbox::timers::{caught_message, run_microtasks, TimerQueue};
use crate::sandbox::watchdog::Watchdog;
use crate::sandbox::ContextExtensions;
use crate::serializer;
use rquickjs::context::EvalOptions;
use rquickjs::function::{Opt, This};
use rquickjs::{CatchResultExt, CaughtError, Context, Ctx, Function, Object, Promise, Runtime, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const NEVER_SETTLED_MESSAGE: &str = "Top-level promise never settled";

/// Runs scripts in a fresh engine runtime per call.
///
/// The runner holds only configuration, so one instance can serve any number
/// of calls. Runtimes are never shared between calls.
#[derive(Debug, Clone)]
pub struct SandboxRunner {
    limits: SandboxLimits,
    timeout: Duration,
    drain_window: Duration,
    poll_interval: Duration,
}

/// How the top-level completion value settles
enum Completion<'js> {
    Immediate(Value<'js>),
    /// A thenable, awaited the way `await` would
    Deferred(Value<'js>),
}

enum SlotState<'js> {
    Pending,
    Settled(std::result::Result<Value<'js>, Value<'js>>),
    Taken,
}

/// Receives the first settlement of the awaited promise. Later calls are ignored.
#[derive(Clone)]
struct SettlementSlot<'js> {
    state: Rc<RefCell<SlotState<'js>>>,
}

impl<'js> SettlementSlot<'js> {
    fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SlotState::Pending)),
        }
    }

    fn settle(&self, outcome: std::result::Result<Value<'js>, Value<'js>>) {
        let mut state = self.state.borrow_mut();
        if matches!(*state, SlotState::Pending) {
            *state = SlotState::Settled(outcome);
        }
    }

    fn take(&self) -> Option<std::result::Result<Value<'js>, Value<'js>>> {
        let mut state = self.state.borrow_mut();
        match std::mem::replace(&mut *state, SlotState::Taken) {
            SlotState::Settled(outcome) => Some(outcome),
            SlotState::Pending => {
                *state = SlotState::Pending;
                None
            }
            SlotState::Taken => None,
        }
    }

    /// Drop any held value and ignore everything after
    fn close(&self) {
        *self.state.borrow_mut() = SlotState::Taken;
    }

    fn callback(&self, ctx: &Ctx<'js>, fulfilled: bool) -> rquickjs::Result<Function<'js>> {
        let slot = self.clone();
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, value: Opt<Value<'js>>| {
            let value = value.0.unwrap_or_else(|| Value::new_undefined(ctx.clone()));
            slot.settle(if fulfilled { Ok(value) } else { Err(value) });
        })
    }
}

impl SandboxRunner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            limits: config.sandbox.clone(),
            timeout: config.timeout(),
            drain_window: config.drain_window(),
            poll_interval: config.drain_poll_interval(),
        }
    }

    /// Run `code` with `extensions` bound as globals. Never fails: errors,
    /// rejections and timeouts all become a failed result carrying the logs
    /// written so far.
    pub fn run(&self, id: Uuid, code: &str, extensions: &ContextExtensions) -> ExecutionResult {
        let logs = LogBuffer::new(self.limits.max_log_bytes);
        let started = Instant::now();
        let outcome = self.run_isolated(code, extensions, &logs);
        log::debug!("Sandbox run {} finished in {:?}", id, started.elapsed());

        match outcome {
            Ok(result) => ExecutionResult::succeeded(id, Some(result), logs.take()),
            Err(e) => {
                if let EngineError::Timeout(budget) = e {
                    audit::timed_out(id, Language::JavaScript.as_str(), "run", budget);
                }
                ExecutionResult::failed(id, e.to_string(), logs.take())
            }
        }
    }

    fn run_isolated(&self, code: &str, extensions: &ContextExtensions, logs: &LogBuffer) -> Result<String> {
        let runtime = Runtime::new()
            .map_err(|e| EngineError::Script(format!("Failed to create script runtime: {}", e)))?;
        runtime.set_memory_limit(self.limits.memory_limit_bytes);
        runtime.set_max_stack_size(self.limits.max_stack_bytes);

        let watchdog = Watchdog::new();
        runtime.set_interrupt_handler(Some(watchdog.interrupt_handler()));

        let context = Context::full(&runtime)
            .map_err(|e| EngineError::Script(format!("Failed to create script context: {}", e)))?;

        context.with(|ctx| {
            let timers = TimerQueue::new(logs.clone(), self.limits.serialize_depth);
            let outcome = self.execute(&ctx, code, extensions, logs, &timers, &watchdog);
            // Timer callbacks hold script values and must not outlive the context
            timers.clear_all();
            outcome
        })
    }

    fn execute<'js>(
        &self,
        ctx: &Ctx<'js>,
        code: &str,
        extensions: &ContextExtensions,
        logs: &LogBuffer,
        timers: &TimerQueue<'js>,
        watchdog: &Watchdog,
    ) -> Result<String> {
        let depth = self.limits.serialize_depth;

        install_globals(ctx, logs, timers, depth)
            .map_err(|e| EngineError::Script(format!("Failed to prepare sandbox: {}", e)))?;

        watchdog.arm(self.timeout);
        // An interrupted extension expression reports the timeout, not "interrupted"
        install_extensions(ctx, extensions, depth).map_err(|e| {
            if watchdog.tripped() || watchdog.expired() {
                self.timeout_error()
            } else {
                e
            }
        })?;

        let mut options = EvalOptions::default();
        options.strict = false;
        options.global = true;
        let completion = match ctx.eval_with_options::<Value<'js>, _>(code, options).catch(ctx) {
            Ok(value) => value,
            Err(caught) => return Err(self.uncaught(ctx, caught, watchdog)),
        };

        let value = match completion_of(ctx, completion) {
            Completion::Immediate(value) => value,
            Completion::Deferred(thenable) => self.await_settlement(ctx, thenable, timers, watchdog)?,
        };

        self.drain(ctx, timers, watchdog);

        let budget = Duration::from_millis(self.limits.serialize_budget_ms);
        watchdog.arm(budget);
        Ok(serializer::serialize_until(ctx, &value, depth, Instant::now() + budget))
    }

    /// Adopt the thenable into an engine promise and run the event loop until
    /// that promise settles
    fn await_settlement<'js>(
        &self,
        ctx: &Ctx<'js>,
        thenable: Value<'js>,
        timers: &TimerQueue<'js>,
        watchdog: &Watchdog,
    ) -> Result<Value<'js>> {
        let slot = SettlementSlot::new();
        let outcome = self.pump_until_settled(ctx, thenable, &slot, timers, watchdog);
        slot.close();
        outcome
    }

    fn pump_until_settled<'js>(
        &self,
        ctx: &Ctx<'js>,
        thenable: Value<'js>,
        slot: &SettlementSlot<'js>,
        timers: &TimerQueue<'js>,
        watchdog: &Watchdog,
    ) -> Result<Value<'js>> {
        let subscribed = self.subscribe(ctx, thenable, slot);
        if let Err(caught) = subscribed.catch(ctx) {
            return Err(self.uncaught(ctx, caught, watchdog));
        }

        loop {
            run_microtasks(ctx, watchdog);

            match slot.take() {
                Some(Ok(value)) => return Ok(value),
                Some(Err(reason)) => return Err(self.rejection(ctx, reason, watchdog)),
                None => {}
            }

            if watchdog.expired() {
                return Err(self.timeout_error());
            }

            if timers.fire_due(ctx, watchdog) {
                continue;
            }

            let Some(next_due) = timers.next_due() else {
                return Err(EngineError::Script(NEVER_SETTLED_MESSAGE.to_string()));
            };
            let until_due = next_due.saturating_duration_since(Instant::now());
            std::thread::sleep(until_due.min(watchdog.remaining()));
        }
    }

    /// Resolving an engine promise with the thenable follows nested thenables
    /// until a plain value or a rejection comes out
    fn subscribe<'js>(
        &self,
        ctx: &Ctx<'js>,
        thenable: Value<'js>,
        slot: &SettlementSlot<'js>,
    ) -> rquickjs::Result<()> {
        let (promise, resolve, _reject) = Promise::new(ctx)?;
        resolve.call::<_, ()>((thenable,))?;

        let then = promise.then()?;
        let on_fulfilled = slot.callback(ctx, true)?;
        let on_rejected = slot.callback(ctx, false)?;
        then.call::<_, Value<'js>>((This(Object::clone(&promise)), on_fulfilled, on_rejected))?;
        Ok(())
    }

    /// Give outstanding timeouts a bounded window to run after the result settles
    fn drain<'js>(&self, ctx: &Ctx<'js>, timers: &TimerQueue<'js>, watchdog: &Watchdog) {
        watchdog.arm(self.drain_window);

        loop {
            run_microtasks(ctx, watchdog);
            if timers.outstanding() == 0 || watchdog.expired() {
                break;
            }
            if timers.fire_due(ctx, watchdog) {
                continue;
            }

            let until_due = timers
                .next_due()
                .map(|due| due.saturating_duration_since(Instant::now()))
                .unwrap_or(self.poll_interval);
            std::thread::sleep(until_due.min(self.poll_interval).min(watchdog.remaining()));
        }

        if timers.outstanding() > 0 {
            log::debug!(
                "Drain window of {:?} closed with {} timeout(s) still pending",
                self.drain_window,
                timers.outstanding()
            );
        }
    }

    fn timeout_error(&self) -> EngineError {
        EngineError::Timeout(self.timeout)
    }

    /// A synchronous throw out of the top-level script or its `then`
    fn uncaught<'js>(&self, ctx: &Ctx<'js>, caught: CaughtError<'js>, watchdog: &Watchdog) -> EngineError {
        if watchdog.tripped() || watchdog.expired() {
            return self.timeout_error();
        }
        watchdog.arm(Duration::from_millis(self.limits.serialize_budget_ms));
        EngineError::Script(caught_message(ctx, caught, self.limits.serialize_depth))
    }

    /// Rejection reasons report their message when error-like, else their rendering
    fn rejection<'js>(&self, ctx: &Ctx<'js>, reason: Value<'js>, watchdog: &Watchdog) -> EngineError {
        if watchdog.expired() {
            return self.timeout_error();
        }
        watchdog.arm(Duration::from_millis(self.limits.serialize_budget_ms));

        let message = reason
            .as_object()
            .and_then(|object| match object.get::<_, Value<'js>>("message") {
                Ok(message) => Some(message),
                Err(_) => {
                    let _ = ctx.catch();
                    None
                }
            })
            .and_then(|message| message.as_string().and_then(|s| s.to_string().ok()))
            .filter(|message| !message.is_empty());

        EngineError::Script(
            message.unwrap_or_else(|| serializer::serialize(ctx, &reason, self.limits.serialize_depth)),
        )
    }
}

/// Anything with a callable `then` is awaited
fn completion_of<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Completion<'js> {
    let Some(object) = value.as_object() else {
        return Completion::Immediate(value);
    };
    match object.get::<_, Value<'js>>("then") {
        Ok(then) if then.as_function().is_some() => Completion::Deferred(value),
        Ok(_) => Completion::Immediate(value),
        Err(_) => {
            let _ = ctx.catch();
            Completion::Immediate(value)
        }
    }
}
