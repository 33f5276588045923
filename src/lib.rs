//! execbox: multi-language code execution engine
//!
//! One call, [`Engine::execute`], runs untrusted code in one of two ways:
//! scripts run in an in-process sandbox with a fresh runtime per call, and
//! every other language runs as a bounded child process in a scratch
//! workspace that is removed before the call returns.
//!
//! # Architecture
//!
//! ## Dispatch ([`engine`])
//! - [`engine::language`]: Closed language set and tag aliases
//! - [`engine::Engine`]: Validated configuration plus both runners
//!
//! ## Script Sandbox ([`sandbox`])
//! - [`sandbox::runner`]: Evaluation, settlement and drain loop
//! - [`sandbox::watchdog`]: Re-armable wall-clock interrupt
//! - [`sandbox::timers`]: Timer table and outstanding-work counter
//! - [`sandbox::console`]: Bounded console capture
//! - [`sandbox::globals`]: Allow-listed globals and context extensions
//!
//! ## Value Rendering ([`serializer`])
//!
//! ## Subprocess Execution ([`exec`], [`judge`], [`verdict`])
//! - [`exec::process`]: Process-group spawn, timeout and kill
//! - [`exec::subprocess`]: Compile, run and cleanup flow
//! - [`judge`]: Per-language compile/run commands
//! - [`verdict::verdict`]: Outcome classification and error text
//!
//! ## Safety & Cleanup ([`safety`])
//! - [`safety::workspace`]: Scratch root and per-execution workspaces
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: Structured audit events
//!
//! ## Configuration ([`config`])
//! - [`config::config`]: Configuration loading
//! - [`config::validator`]: Startup validation
//! - [`config::types`]: Shared result and error types
//!
//! ## Utilities ([`utils`], [`verify`])
//! - [`utils::output`]: Bounded output collection
//! - [`verify`]: Test-case verification of solutions

// Dispatch
pub mod engine;

// Script sandbox
pub mod sandbox;
pub mod serializer;

// Subprocess execution
pub mod exec;
pub mod judge;
pub mod verdict;

// Safety & Cleanup
pub mod safety;

// Observability
pub mod observability;

// Configuration
pub mod config;

// Utilities
pub mod utils;
pub mod verify;

// CLI entrypoint wiring for the execbox binary.
pub mod cli;

pub use config::config::EngineConfig;
pub use config::types::{EngineError, ExecutionResult, Result};
pub use engine::{Engine, Language};
pub use sandbox::{ContextExtensions, ContextValue};
