use crate::config::config::ToolchainConfig;
use crate::engine::language::Language;
use crate::exec::process::CommandSpec;
use crate::judge::adapter::{JudgeAdapter, RunWorkspace};
use crate::judge::languages::{gcc_style_compile, run_artifact};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CppAdapter {
    compiler: String,
    flags: Vec<String>,
}

impl CppAdapter {
    pub fn new(toolchain: &ToolchainConfig) -> Self {
        Self {
            compiler: toolchain.cpp_compiler.clone(),
            flags: toolchain.cpp_flags.clone(),
        }
    }
}

impl JudgeAdapter for CppAdapter {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn source_file_name(&self, id: Uuid, _code: &str) -> String {
        format!("{id}.cpp")
    }

    fn artifact_file_name(&self, id: Uuid) -> Option<String> {
        Some(format!("{id}.out"))
    }

    fn compile_command(&self, workspace: &RunWorkspace) -> Option<CommandSpec> {
        gcc_style_compile(&self.compiler, &self.flags, workspace)
    }

    fn run_command(&self, workspace: &RunWorkspace) -> CommandSpec {
        run_artifact(workspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_cpp_driver_and_extension() {
        let adapter = CppAdapter::new(&ToolchainConfig::default());
        let id = Uuid::new_v4();
        assert!(adapter.source_file_name(id, "").ends_with(".cpp"));
        assert_eq!(adapter.artifact_file_name(id), Some(format!("{id}.out")));
        assert_eq!(adapter.compiler, "g++");
    }
}
