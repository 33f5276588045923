//! In-process script sandbox.
//!
//! Every call gets its own engine runtime and context with a fixed set of
//! globals (console, timers, `Buffer`, `URL`, `Promise`, `process.env`), runs
//! under a re-armable wall-clock watchdog, and is driven by a small event
//! loop until its completion value settles and its timeouts drain.

pub mod console;
pub mod globals;
pub mod runner;
pub mod timers;
pub mod watchdog;

pub use runner::SandboxRunner;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A binding injected into the sandbox globals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ContextValue {
    /// Plain data, materialized with the engine's JSON parser
    Json(serde_json::Value),
    /// An expression evaluated inside the fresh context, e.g. a harness function
    Script(String),
}

impl From<serde_json::Value> for ContextValue {
    fn from(value: serde_json::Value) -> Self {
        ContextValue::Json(value)
    }
}

/// Extension bindings by global name, installed in name order
pub type ContextExtensions = BTreeMap<String, ContextValue>;
