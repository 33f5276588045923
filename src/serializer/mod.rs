//! Value serializer.
//!
//! Renders any script value as bounded text: functions by name, errors by
//! header and stack, promises as a placeholder, arrays with compacted holes,
//! and plain objects as `{ k: v }`. Depth and cycles are guarded, and nothing
//! here ever throws. When introspection fails the value's default string form
//! is used, or `[object]` if even that fails. Past an optional deadline every
//! remaining composite renders as `[...]`.

use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Object, Type, Value};
use std::collections::HashSet;
use std::time::Instant;

pub const DEFAULT_MAX_DEPTH: i32 = 5;

pub const DEPTH_PLACEHOLDER: &str = "[...]";
pub const CIRCULAR_MARKER: &str = "[Circular]";
pub const PROMISE_PLACEHOLDER: &str = "[Promise]";
const OPAQUE_PLACEHOLDER: &str = "[object]";

/// Render `value` for display. A top-level string comes back unquoted.
pub fn serialize<'js>(ctx: &Ctx<'js>, value: &Value<'js>, max_depth: i32) -> String {
    Serializer::new(ctx, None).render(value, max_depth, false)
}

/// Like [`serialize`], but composites reached after `deadline` collapse to `[...]`
pub fn serialize_until<'js>(
    ctx: &Ctx<'js>,
    value: &Value<'js>,
    max_depth: i32,
    deadline: Instant,
) -> String {
    Serializer::new(ctx, Some(deadline)).render(value, max_depth, false)
}

/// One top-level call. `seen` holds every composite visited so far, keyed by
/// identity, so a value reached twice renders as `[Circular]` the second time.
struct Serializer<'js> {
    ctx: Ctx<'js>,
    seen: HashSet<Value<'js>>,
    deadline: Option<Instant>,
}

impl<'js> Serializer<'js> {
    fn new(ctx: &Ctx<'js>, deadline: Option<Instant>) -> Self {
        Self {
            ctx: ctx.clone(),
            seen: HashSet::new(),
            deadline,
        }
    }

    fn out_of_time(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn render(&mut self, value: &Value<'js>, depth: i32, nested: bool) -> String {
        match value.type_of() {
            Type::Undefined => return "undefined".to_string(),
            Type::Null => return "null".to_string(),
            Type::String => {
                let text = self.coerce(value);
                return if nested { quote(&text) } else { text };
            }
            Type::Bool | Type::Int | Type::Float | Type::BigInt => return self.coerce(value),
            Type::Symbol => return self.symbol_text(value),
            _ => {}
        }

        if depth < 0 || self.out_of_time() {
            return DEPTH_PLACEHOLDER.to_string();
        }

        let Some(object) = value.as_object() else {
            return self.coerce(value);
        };

        if matches!(value.type_of(), Type::Function | Type::Constructor) {
            return self.function_label(object);
        }

        if !self.seen.insert(value.clone()) {
            return CIRCULAR_MARKER.to_string();
        }

        if let Some(text) = self.error_text(value, object) {
            return text;
        }

        if self.is_thenable(value, object) {
            return PROMISE_PLACEHOLDER.to_string();
        }

        if value.type_of() == Type::Array {
            return match self.array_text(object, depth) {
                Some(text) => text,
                None => self.coerce(value),
            };
        }

        match self.object_text(object, depth) {
            Some(text) => text,
            None => self.coerce(value),
        }
    }

    /// `[Function: name]`, or `anonymous` for unnamed functions
    fn function_label(&mut self, function: &Object<'js>) -> String {
        let name = self
            .get(function, "name")
            .and_then(|name| name.as_string().and_then(|s| s.to_string().ok()))
            .filter(|name| !name.is_empty());
        format!("[Function: {}]", name.as_deref().unwrap_or("anonymous"))
    }

    /// `Name: message` plus the stack, for engine exceptions and anything
    /// carrying both a truthy message and a truthy stack
    fn error_text(&mut self, value: &Value<'js>, object: &Object<'js>) -> Option<String> {
        let message = self.get(object, "message");
        let stack = self.get(object, "stack");

        let is_exception = value.type_of() == Type::Exception;
        let duck_typed = message.as_ref().map(truthy).unwrap_or(false)
            && stack.as_ref().map(truthy).unwrap_or(false);
        if !is_exception && !duck_typed {
            return None;
        }

        let name = self
            .get(object, "name")
            .filter(truthy)
            .map(|name| self.coerce(&name))
            .unwrap_or_else(|| "Error".to_string());
        let message = message
            .filter(|m| !m.is_undefined())
            .map(|m| self.coerce(&m))
            .unwrap_or_default();
        let header = if message.is_empty() {
            name
        } else {
            format!("{}: {}", name, message)
        };

        let stack = stack
            .filter(truthy)
            .map(|s| self.coerce(&s))
            .unwrap_or_default();
        let stack = stack.trim_end();

        // Some stacks already lead with the header, engine stacks do not
        if stack.is_empty() {
            Some(header)
        } else if stack.starts_with(&header) {
            Some(stack.to_string())
        } else {
            Some(format!("{}\n{}", header, stack))
        }
    }

    fn is_thenable(&mut self, value: &Value<'js>, object: &Object<'js>) -> bool {
        if value.type_of() == Type::Promise {
            return true;
        }
        self.get(object, "then")
            .map(|then| matches!(then.type_of(), Type::Function | Type::Constructor))
            .unwrap_or(false)
    }

    /// `[a, b, <N empty items>, c]`. Only own indices are visited, so the
    /// cost follows the populated slots, not the length.
    fn array_text(&mut self, array: &Object<'js>, depth: i32) -> Option<String> {
        let length = self
            .get(array, "length")
            .and_then(|len| len.as_number())
            .filter(|len| len.is_finite() && *len >= 0.0)? as u64;

        let mut indices: Vec<u64> = Vec::new();
        for key in array.keys::<String>() {
            let key = match key {
                Ok(key) => key,
                Err(_) => {
                    self.clear_exception();
                    return None;
                }
            };
            if let Ok(index) = key.parse::<u64>() {
                if index < length {
                    indices.push(index);
                }
            }
        }
        indices.sort_unstable();

        let mut parts = Vec::with_capacity(indices.len());
        let mut next = 0u64;
        for index in indices {
            if self.out_of_time() {
                parts.push(DEPTH_PLACEHOLDER.to_string());
                return Some(format!("[{}]", parts.join(", ")));
            }
            if index > next {
                parts.push(format!("<{} empty items>", index - next));
            }
            let element = self.get(array, &index.to_string()).unwrap_or_else(|| self.undefined());
            parts.push(self.render(&element, depth - 1, true));
            next = index + 1;
        }
        if length > next {
            parts.push(format!("<{} empty items>", length - next));
        }

        Some(format!("[{}]", parts.join(", ")))
    }

    /// `{ k: v, ... }` over own enumerable string keys, `{}` when there are none
    fn object_text(&mut self, object: &Object<'js>, depth: i32) -> Option<String> {
        let mut entries = Vec::new();
        for entry in object.props::<String, Value<'js>>() {
            if self.out_of_time() {
                break;
            }
            match entry {
                Ok(entry) => entries.push(entry),
                Err(_) => {
                    self.clear_exception();
                    return None;
                }
            }
        }

        if entries.is_empty() {
            return Some("{}".to_string());
        }

        let content = entries
            .iter()
            .map(|(key, value)| format!("{}: {}", key, self.render(value, depth - 1, true)))
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!("{{ {} }}", content))
    }

    fn symbol_text(&mut self, value: &Value<'js>) -> String {
        let description = value
            .as_symbol()
            .and_then(|symbol| symbol.description().ok())
            .filter(|d| !d.is_undefined())
            .map(|d| self.coerce(&d))
            .unwrap_or_default();
        format!("Symbol({})", description)
    }

    /// Property read that swallows getter exceptions
    fn get(&mut self, object: &Object<'js>, key: &str) -> Option<Value<'js>> {
        match object.get::<_, Value<'js>>(key) {
            Ok(value) => Some(value),
            Err(_) => {
                self.clear_exception();
                None
            }
        }
    }

    /// The engine's own ToString, with `[object]` when even that throws
    fn coerce(&mut self, value: &Value<'js>) -> String {
        match value.get::<Coerced<String>>() {
            Ok(Coerced(text)) => text,
            Err(_) => {
                self.clear_exception();
                OPAQUE_PLACEHOLDER.to_string()
            }
        }
    }

    fn undefined(&self) -> Value<'js> {
        Value::new_undefined(self.ctx.clone())
    }

    fn clear_exception(&self) {
        let _ = self.ctx.catch();
    }
}

/// Script truthiness for the values the serializer inspects
fn truthy(value: &Value<'_>) -> bool {
    match value.type_of() {
        Type::Undefined | Type::Null => false,
        Type::Bool => value.as_bool().unwrap_or(false),
        Type::Int => value.as_int().map(|i| i != 0).unwrap_or(false),
        Type::Float => value.as_float().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Type::String => value
            .as_string()
            .and_then(|s| s.to_string().ok())
            .map(|s| !s.is_empty())
            .unwrap_or(false),
        _ => true,
    }
}

/// Single-quoted, escaped form used for strings inside composites
fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for ch in text.chars() {
        match ch {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    fn render(source: &str) -> String {
        render_depth(source, DEFAULT_MAX_DEPTH)
    }

    fn render_depth(source: &str, depth: i32) -> String {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            let value: Value = ctx.eval(source).unwrap();
            serialize(&ctx, &value, depth)
        })
    }

    #[test]
    fn test_primitives() {
        assert_eq!(render("undefined"), "undefined");
        assert_eq!(render("null"), "null");
        assert_eq!(render("true"), "true");
        assert_eq!(render("1 + 1"), "2");
        assert_eq!(render("0.1 + 0.2"), "0.30000000000000004");
        assert_eq!(render("1 / 0"), "Infinity");
        assert_eq!(render("10n ** 20n"), "100000000000000000000");
    }

    #[test]
    fn test_top_level_string_is_raw() {
        assert_eq!(render("'hello'"), "hello");
    }

    #[test]
    fn test_nested_strings_are_quoted() {
        assert_eq!(render("({ a: 'x', b: [\"it's\"] })"), "{ a: 'x', b: ['it\\'s'] }");
    }

    #[test]
    fn test_functions() {
        assert_eq!(render("(function add(a, b) { return a + b; })"), "[Function: add]");
        assert_eq!(render("[function () {}]"), "[[Function: anonymous]]");
        assert_eq!(render("(class Point {})"), "[Function: Point]");
    }

    #[test]
    fn test_error_has_header_and_stack() {
        let text = render("(function boom() { return new TypeError('bad input'); })()");
        assert!(text.starts_with("TypeError: bad input"), "{}", text);
        assert!(text.contains("boom"), "{}", text);
    }

    #[test]
    fn test_duck_typed_error_keeps_own_stack() {
        let text = render("({ name: 'Custom', message: 'm', stack: 'Custom: m\\n  at x' })");
        assert_eq!(text, "Custom: m\n  at x");
    }

    #[test]
    fn test_promises_and_thenables() {
        assert_eq!(render("Promise.resolve(1)"), "[Promise]");
        assert_eq!(render("({ then() {} })"), "[Promise]");
        assert_eq!(render("({ then: 1 })"), "{ then: 1 }");
    }

    #[test]
    fn test_sparse_array_compaction() {
        assert_eq!(render("const a = []; a[0] = 1; a[4] = 5; a"), "[1, <3 empty items>, 5]");
        assert_eq!(render("[, , 1]"), "[<2 empty items>, 1]");
        assert_eq!(render("new Array(3)"), "[<3 empty items>]");
        assert_eq!(render("const b = [1]; b[1e6] = 2; b"), "[1, <999999 empty items>, 2]");
    }

    #[test]
    fn test_objects() {
        assert_eq!(render("({})"), "{}");
        assert_eq!(render("({ a: 1, b: { c: null } })"), "{ a: 1, b: { c: null } }");
    }

    #[test]
    fn test_cycle_marker() {
        assert_eq!(render("const o = {}; o.self = o; o"), "{ self: [Circular] }");
        assert_eq!(render("const a = [1]; a.push(a); a"), "[1, [Circular]]");
    }

    #[test]
    fn test_shared_reference_renders_once() {
        assert_eq!(
            render("const s = { v: 1 }; ({ a: s, b: s })"),
            "{ a: { v: 1 }, b: [Circular] }"
        );
    }

    #[test]
    fn test_many_small_objects_render_in_linear_time() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            let value: Value = ctx
                .eval("Array.from({ length: 200000 }, (_, i) => ({ i }))")
                .unwrap();
            let started = Instant::now();
            let text = serialize(&ctx, &value, DEFAULT_MAX_DEPTH);
            assert!(started.elapsed() < std::time::Duration::from_secs(3), "took {:?}", started.elapsed());
            assert!(text.starts_with("[{ i: 0 }, { i: 1 }"));
            assert!(text.ends_with("{ i: 199999 }]"));
        });
    }

    #[test]
    fn test_passed_deadline_collapses_composites() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            let value: Value = ctx.eval("({ a: [1, 2], b: 'x' })").unwrap();
            assert_eq!(serialize_until(&ctx, &value, DEFAULT_MAX_DEPTH, Instant::now()), "[...]");

            let scalar: Value = ctx.eval("42").unwrap();
            assert_eq!(serialize_until(&ctx, &scalar, DEFAULT_MAX_DEPTH, Instant::now()), "42");
        });
    }

    #[test]
    fn test_depth_guard() {
        assert_eq!(
            render("({ a: { b: { c: { d: { e: { f: { g: 1 } } } } } } })"),
            "{ a: { b: { c: { d: { e: { f: [...] } } } } } }"
        );
        assert_eq!(render_depth("({ a: 1 })", -1), "[...]");
    }

    #[test]
    fn test_throwing_getter_degrades() {
        let text = render("({ get boom() { throw new Error('no'); } })");
        assert!(!text.is_empty());
    }

    #[test]
    fn test_null_prototype_object() {
        assert_eq!(render("const o = Object.create(null); o.x = 1; o"), "{ x: 1 }");
    }

    #[test]
    fn test_symbol() {
        assert_eq!(render("Symbol('tag')"), "Symbol(tag)");
        assert_eq!(render("({ s: Symbol() })"), "{ s: Symbol() }");
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a'b\\c\n"), "'a\\'b\\\\c\\n'");
    }
}
