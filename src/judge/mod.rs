//! Judge adapters.
//!
//! The subprocess runner stays language-agnostic. Adapters define
//! source file naming and compile/run commands for each external language.

pub mod adapter;
pub mod languages;
pub mod registry;

pub use adapter::{JudgeAdapter, RunWorkspace};
pub use registry::adapter_for;
