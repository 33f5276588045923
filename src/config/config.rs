/// Engine configuration loading from execbox.json and the environment
use crate::config::types::{EngineError, Result};
use crate::utils::output::OutputLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_DRAIN_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_SERIALIZE_DEPTH: i32 = 5;

const CONFIG_FILE_NAME: &str = "execbox.json";
const SCRATCH_DIR_NAME: &str = "execbox-scratch";

/// Limits applied to the in-process script sandbox
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxLimits {
    /// Heap ceiling for one script runtime (bytes)
    pub memory_limit_bytes: usize,
    /// Native stack ceiling for one script runtime (bytes)
    pub max_stack_bytes: usize,
    /// Byte budget for the console buffer
    pub max_log_bytes: usize,
    /// Starting depth for value rendering
    pub serialize_depth: i32,
    /// Time allowed for rendering the final value after the run settles
    pub serialize_budget_ms: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_limit_bytes: 64 * 1024 * 1024,
            max_stack_bytes: 1024 * 1024,
            max_log_bytes: 1024 * 1024,
            serialize_depth: DEFAULT_SERIALIZE_DEPTH,
            serialize_budget_ms: 1000,
        }
    }
}

/// External executables used by the subprocess back-ends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolchainConfig {
    pub python: String,
    pub python_flags: Vec<String>,
    pub c_compiler: String,
    pub c_flags: Vec<String>,
    pub cpp_compiler: String,
    pub cpp_flags: Vec<String>,
    pub java_compiler: String,
    pub java_runtime: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            python_flags: Vec::new(),
            c_compiler: "gcc".to_string(),
            c_flags: Vec::new(),
            cpp_compiler: "g++".to_string(),
            cpp_flags: Vec::new(),
            java_compiler: "javac".to_string(),
            java_runtime: "java".to_string(),
        }
    }
}

/// Full execbox.json structure. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Wall-clock budget for the run phase of every back-end
    pub timeout_ms: u64,
    /// Wall-clock budget for the compile phase of compiled back-ends
    pub compile_timeout_ms: u64,
    /// How long outstanding timers may keep a script alive after it settles.
    /// `None` means the run timeout.
    pub drain_window_ms: Option<u64>,
    pub drain_poll_interval_ms: u64,
    /// Process-wide scratch root. `None` means `<tmp>/execbox-scratch`.
    pub scratch_dir: Option<PathBuf>,
    /// Append-only file mirroring audit events. The first engine to set one
    /// in a process owns it.
    pub audit_file: Option<PathBuf>,
    pub sandbox: SandboxLimits,
    pub output: OutputLimits,
    pub toolchain: ToolchainConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            compile_timeout_ms: DEFAULT_COMPILE_TIMEOUT_MS,
            drain_window_ms: None,
            drain_poll_interval_ms: DEFAULT_DRAIN_POLL_INTERVAL_MS,
            scratch_dir: None,
            audit_file: None,
            sandbox: SandboxLimits::default(),
            output: OutputLimits::default(),
            toolchain: ToolchainConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let config: EngineConfig = serde_json::from_str(&config_content)
            .map_err(|e| EngineError::Config(format!("Failed to parse config JSON: {}", e)))?;

        Ok(config)
    }

    /// Load ./execbox.json when present, defaults otherwise, then apply
    /// `EXECBOX_*` environment overrides.
    pub fn load_default() -> Result<Self> {
        let config_path = std::env::current_dir()
            .map_err(|e| EngineError::Config(format!("Failed to get current directory: {}", e)))?
            .join(CONFIG_FILE_NAME);

        let mut config = if config_path.exists() {
            log::debug!("Loading engine config from {}", config_path.display());
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("EXECBOX_TIMEOUT_MS") {
            self.timeout_ms = raw.trim().parse().map_err(|e| {
                EngineError::Config(format!("EXECBOX_TIMEOUT_MS is not a number: {}", e))
            })?;
        }
        if let Some(raw) = lookup("EXECBOX_COMPILE_TIMEOUT_MS") {
            self.compile_timeout_ms = raw.trim().parse().map_err(|e| {
                EngineError::Config(format!("EXECBOX_COMPILE_TIMEOUT_MS is not a number: {}", e))
            })?;
        }
        if let Some(dir) = lookup("EXECBOX_SCRATCH_DIR") {
            if !dir.trim().is_empty() {
                self.scratch_dir = Some(PathBuf::from(dir));
            }
        }
        if let Some(path) = lookup("EXECBOX_AUDIT_FILE") {
            if !path.trim().is_empty() {
                self.audit_file = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    pub fn drain_window(&self) -> Duration {
        Duration::from_millis(self.drain_window_ms.unwrap_or(self.timeout_ms))
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(SCRATCH_DIR_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_budgets() {
        let config = EngineConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(5000));
        assert_eq!(config.drain_poll_interval(), Duration::from_millis(100));
        assert_eq!(config.drain_window(), config.timeout());
        assert!(config.compile_timeout() > config.timeout());
        assert_eq!(config.sandbox.serialize_depth, 5);
        assert!(config.scratch_dir().ends_with(SCRATCH_DIR_NAME));
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("execbox.json");
        std::fs::write(
            &path,
            r#"{ "timeout_ms": 250, "toolchain": { "python": "/usr/bin/python3" } }"#,
        )
        .unwrap();

        let config = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.toolchain.python, "/usr/bin/python3");
        assert_eq!(config.toolchain.c_compiler, "gcc");
        assert_eq!(config.drain_window(), Duration::from_millis(250));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("execbox.json");
        std::fs::write(&path, "{ not json").unwrap();

        match EngineConfig::load_from_file(&path) {
            Err(EngineError::Config(msg)) => assert!(msg.contains("Failed to parse")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("EXECBOX_TIMEOUT_MS", "1200"),
            ("EXECBOX_SCRATCH_DIR", "/var/tmp/eb"),
            ("EXECBOX_AUDIT_FILE", "/var/log/eb/audit.jsonl"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config
            .apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.timeout_ms, 1200);
        assert_eq!(config.scratch_dir(), PathBuf::from("/var/tmp/eb"));
        assert_eq!(config.audit_file, Some(PathBuf::from("/var/log/eb/audit.jsonl")));
    }

    #[test]
    fn bad_env_override_is_rejected() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_env_overrides(|key| (key == "EXECBOX_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("EXECBOX_TIMEOUT_MS"));
    }
}
