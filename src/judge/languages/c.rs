use crate::config::config::ToolchainConfig;
use crate::engine::language::Language;
use crate::exec::process::CommandSpec;
use crate::judge::adapter::{JudgeAdapter, RunWorkspace};
use crate::judge::languages::{gcc_style_compile, run_artifact};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CAdapter {
    compiler: String,
    flags: Vec<String>,
}

impl CAdapter {
    pub fn new(toolchain: &ToolchainConfig) -> Self {
        Self {
            compiler: toolchain.c_compiler.clone(),
            flags: toolchain.c_flags.clone(),
        }
    }
}

impl JudgeAdapter for CAdapter {
    fn language(&self) -> Language {
        Language::C
    }

    fn source_file_name(&self, id: Uuid, _code: &str) -> String {
        format!("{id}.c")
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
    use std::path::PathBuf;

    #[test]
    fn compiles_then_runs_artifact() {
        let mut toolchain = ToolchainConfig::default();
        toolchain.c_flags = vec!["-O2".to_string()];
        let adapter = CAdapter::new(&toolchain);
        let id = Uuid::nil();
        let workspace = RunWorkspace {
            workdir: PathBuf::from("/scratch"),
            source: PathBuf::from("/scratch").join(adapter.source_file_name(id, "")),
            artifact: adapter
                .artifact_file_name(id)
                .map(|name| PathBuf::from("/scratch").join(name)),
        };

        let compile = adapter.compile_command(&workspace).unwrap();
        assert_eq!(compile.program, "gcc");
        assert_eq!(
            compile.args,
            [
                "-O2",
                "/scratch/00000000-0000-0000-0000-000000000000.c",
                "-o",
                "/scratch/00000000-0000-0000-0000-000000000000.out",
            ]
        );
        assert_eq!(
            adapter.run_command(&workspace).program,
            "/scratch/00000000-0000-0000-0000-000000000000.out"
        );
    }
}
