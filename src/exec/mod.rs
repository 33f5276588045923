//! Execution control
//!
//! Child process launch under a wall-clock limit, and the shared
//! compile-run-cleanup flow of the subprocess back-ends.

pub mod process;
pub mod subprocess;
