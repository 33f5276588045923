use crate::engine::language::Language;
use crate::exec::process::CommandSpec;
use std::path::PathBuf;
use uuid::Uuid;

/// Paths an adapter builds its commands from. `workdir` is private to one
/// execution and is the working directory of every command.
#[derive(Debug, Clone)]
pub struct RunWorkspace {
    pub workdir: PathBuf,
    pub source: PathBuf,
    /// Build output, for compiled languages that produce a single file
    pub artifact: Option<PathBuf>,
}

/// Judge adapter contract for language-specific compile/run stages.
pub trait JudgeAdapter: Send + Sync {
    fn language(&self) -> Language;

    /// File name for the submitted source. Derived from `id` unless the
    /// toolchain dictates otherwise.
    fn source_file_name(&self, id: Uuid, code: &str) -> String;

    fn artifact_file_name(&self, _id: Uuid) -> Option<String> {
        None
    }

    /// `None` for interpreted languages
    fn compile_command(&self, workspace: &RunWorkspace) -> Option<CommandSpec>;

    fn run_command(&self, workspace: &RunWorkspace) -> CommandSpec;
}
