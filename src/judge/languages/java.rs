use crate::config::config::ToolchainConfig;
use crate::engine::language::Language;
use crate::exec::process::CommandSpec;
use crate::judge::adapter::{JudgeAdapter, RunWorkspace};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

pub const DEFAULT_CLASS_NAME: &str = "Main";

static PUBLIC_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"public\s+class\s+([A-Za-z0-9_$]+)").expect("valid class regex"));

/// Name of the first `public class` in `code`, or `Main`.
///
/// A text scan, not a parse: a match inside a comment or string literal wins
/// just the same.
pub fn extract_class_name(code: &str) -> String {
    PUBLIC_CLASS
        .captures(code)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_CLASS_NAME.to_string())
}

#[derive(Debug, Clone)]
pub struct JavaAdapter {
    compiler: String,
    runtime: String,
}

impl JavaAdapter {
    pub fn new(toolchain: &ToolchainConfig) -> Self {
        Self {
            compiler: toolchain.java_compiler.clone(),
            runtime: toolchain.java_runtime.clone(),
        }
    }
}

impl JudgeAdapter for JavaAdapter {
    fn language(&self) -> Language {
        Language::Java
    }

    // File name must match the class
    fn source_file_name(&self, _id: Uuid, code: &str) -> String {
        format!("{}.java", extract_class_name(code))
    }

    fn compile_command(&self, workspace: &RunWorkspace) -> Option<CommandSpec> {
        Some(
            CommandSpec::new(&self.compiler, &workspace.workdir)
                .args(["-encoding", "UTF-8"])
                .arg(workspace.source.to_string_lossy()),
        )
    }

    fn run_command(&self, workspace: &RunWorkspace) -> CommandSpec {
        let class_name = workspace
            .source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_CLASS_NAME.to_string());

        CommandSpec::new(&self.runtime, &workspace.workdir)
            .arg("-cp")
            .arg(workspace.workdir.to_string_lossy())
            .arg(class_name)
    }
}
