//! Safety and cleanup
//!
//! Scratch workspaces that never outlive their execution.

pub mod workspace;
