// Config validation at engine startup.
// Zero budgets are fatal; suspicious but workable values become warnings.

use crate::config::config::EngineConfig;
use crate::config::types::{EngineError, Result};

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Validate config at startup. Errors are fatal, warnings are returned to the caller.
pub fn validate_config(config: &EngineConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_budgets(config, &mut result);
    validate_sandbox(config, &mut result);
    validate_toolchain(config, &mut result);

    if !result.is_valid() {
        let error_msg = format!("Config validation failed:\n{}", result.errors.join("\n"));
        return Err(EngineError::Config(error_msg));
    }

    Ok(result)
}

fn validate_budgets(config: &EngineConfig, result: &mut ValidationResult) {
    if config.timeout_ms == 0 {
        result.add_error("timeout_ms cannot be zero".to_string());
    }
    if config.compile_timeout_ms == 0 {
        result.add_error("compile_timeout_ms cannot be zero".to_string());
    }
    if config.drain_poll_interval_ms == 0 {
        result.add_error("drain_poll_interval_ms cannot be zero".to_string());
    }

    if config.compile_timeout_ms < config.timeout_ms {
        result.add_warning(format!(
            "compile_timeout_ms ({}) is shorter than timeout_ms ({}), compilers may be cut off",
            config.compile_timeout_ms, config.timeout_ms
        ));
    }
    if config.drain_poll_interval_ms > config.drain_window().as_millis() as u64 {
        result.add_warning(format!(
            "drain_poll_interval_ms ({}) exceeds the drain window, timers get a single check",
            config.drain_poll_interval_ms
        ));
    }
    if config.output.stdout_limit == 0 {
        result.add_error("output.stdout_limit cannot be zero".to_string());
    }
}

fn validate_sandbox(config: &EngineConfig, result: &mut ValidationResult) {
    let sandbox = &config.sandbox;

    if sandbox.serialize_depth < 0 {
        result.add_error(format!(
            "sandbox.serialize_depth must be >= 0 (got {})",
            sandbox.serialize_depth
        ));
    }
    if sandbox.max_log_bytes == 0 {
        result.add_error("sandbox.max_log_bytes cannot be zero".to_string());
    }
    if sandbox.memory_limit_bytes < 1024 * 1024 {
        result.add_warning(format!(
            "sandbox.memory_limit_bytes {} is very low (< 1MB), scripts may fail to start",
            sandbox.memory_limit_bytes
        ));
    }
    if sandbox.max_stack_bytes < 64 * 1024 {
        result.add_warning(format!(
            "sandbox.max_stack_bytes {} is very low (< 64KB)",
            sandbox.max_stack_bytes
        ));
    }
}

fn validate_toolchain(config: &EngineConfig, result: &mut ValidationResult) {
    let toolchain = &config.toolchain;
    let commands = [
        ("toolchain.python", &toolchain.python),
        ("toolchain.c_compiler", &toolchain.c_compiler),
        ("toolchain.cpp_compiler", &toolchain.cpp_compiler),
        ("toolchain.java_compiler", &toolchain.java_compiler),
        ("toolchain.java_runtime", &toolchain.java_runtime),
    ];

    for (name, command) in commands {
        if command.trim().is_empty() {
            result.add_error(format!("{} cannot be empty", name));
        }
    }
}
