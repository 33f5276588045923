use crate::serializer;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Object, Value};
use std::cell::RefCell;
use std::rc::Rc;

pub const TRUNCATION_MARKER: &str = "[output truncated]";

/// Ordered log lines for one execution, bounded by a byte budget.
///
/// Once the budget is spent a single truncation marker is appended and every
/// later line is dropped.
#[derive(Clone, Debug)]
pub struct LogBuffer {
    inner: Rc<RefCell<LogState>>,
}

#[derive(Debug)]
struct LogState {
    lines: Vec<String>,
    bytes: usize,
    limit: usize,
    truncated: bool,
}

impl LogBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(LogState {
                lines: Vec::new(),
                bytes: 0,
                limit,
                truncated: false,
            })),
        }
    }

    pub fn push(&self, line: String) {
        let mut state = self.inner.borrow_mut();
        if state.truncated {
            return;
        }
        if state.bytes + line.len() > state.limit {
            state.truncated = true;
            state.lines.push(TRUNCATION_MARKER.to_string());
            return;
        }
        state.bytes += line.len();
        state.lines.push(line);
    }

    /// Move the lines out, leaving the buffer empty
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut self.inner.borrow_mut().lines)
    }
}

/// Console method name and the prefix its lines carry
const METHODS: [(&str, &str); 4] = [
    ("log", ""),
    ("error", "ERROR: "),
    ("warn", "WARN: "),
    ("info", "INFO: "),
];

/// Build the sandbox `console` object writing into `logs`
pub fn build_console<'js>(
    ctx: &Ctx<'js>,
    logs: &LogBuffer,
    depth: i32,
) -> rquickjs::Result<Object<'js>> {
    let console = Object::new(ctx.clone())?;
    for (name, prefix) in METHODS {
        let logs = logs.clone();
        let method = Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
            logs.push(format_line(&ctx, prefix, &args.0, depth));
        })?
        .with_name(name)?;
        console.set(name, method)?;
    }
    Ok(console)
}

/// Each argument rendered on its own, joined by single spaces
pub fn format_line<'js>(ctx: &Ctx<'js>, prefix: &str, args: &[Value<'js>], depth: i32) -> String {
    let rendered = args
        .iter()
        .map(|arg| serializer::serialize(ctx, arg, depth))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{}{}", prefix, rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_order() {
        let logs = LogBuffer::new(1024);
        logs.push("a".into());
        logs.push("b".into());
        assert_eq!(logs.take(), ["a", "b"]);
        assert!(logs.take().is_empty());
    }

    #[test]
    fn truncates_once() {
        let logs = LogBuffer::new(10);
        logs.push("12345".into());
        logs.push("123456".into());
        logs.push("1".into());
        assert_eq!(logs.take(), ["12345", TRUNCATION_MARKER]);
    }
}
