use crate::config::config::ToolchainConfig;
use crate::engine::language::Language;
use crate::exec::process::CommandSpec;
use crate::judge::adapter::{JudgeAdapter, RunWorkspace};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PythonAdapter {
    interpreter: String,
    flags: Vec<String>,
}

impl PythonAdapter {
    pub fn new(toolchain: &ToolchainConfig) -> Self {
        Self {
            interpreter: toolchain.python.clone(),
            flags: toolchain.python_flags.clone(),
        }
    }
}

impl JudgeAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn source_file_name(&self, id: Uuid, _code: &str) -> String {
        format!("{id}.py")
    }

    fn compile_command(&self, _workspace: &RunWorkspace) -> Option<CommandSpec> {
        None
    }

    fn run_command(&self, workspace: &RunWorkspace) -> CommandSpec {
        CommandSpec::new(&self.interpreter, &workspace.workdir)
            .args(self.flags.iter().cloned())
            .arg(workspace.source.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn runs_interpreter_on_source() {
        let adapter = PythonAdapter::new(&ToolchainConfig::default());
        let workspace = RunWorkspace {
            workdir: PathBuf::from("/scratch"),
            source: PathBuf::from("/scratch/a.py"),
            artifact: None,
        };
        assert!(adapter.compile_command(&workspace).is_none());
        let run = adapter.run_command(&workspace);
        assert_eq!(run.program, "python3");
        assert_eq!(run.args.last().map(String::as_str), Some("/scratch/a.py"));
    }
}
