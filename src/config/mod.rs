//! Configuration
//!
//! Engine configuration loading, shared types and startup validation.

pub mod config;
pub mod types;
pub mod validator;
