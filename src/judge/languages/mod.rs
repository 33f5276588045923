//! Per-language adapters.

pub mod c;
pub mod cpp;
pub mod java;
pub mod python;

use crate::exec::process::CommandSpec;
use crate::judge::adapter::RunWorkspace;

/// `<compiler> [flags] <source> -o <artifact>`, shared by gcc-style drivers
pub(crate) fn gcc_style_compile(
    compiler: &str,
    flags: &[String],
    workspace: &RunWorkspace,
) -> Option<CommandSpec> {
    let artifact = workspace.artifact.as_ref()?;
    Some(
        CommandSpec::new(compiler, &workspace.workdir)
            .args(flags.iter().cloned())
            .arg(workspace.source.to_string_lossy())
            .arg("-o")
            .arg(artifact.to_string_lossy()),
    )
}

/// Execute the built artifact directly
pub(crate) fn run_artifact(workspace: &RunWorkspace) -> CommandSpec {
    let program = workspace
        .artifact
        .as_ref()
        .unwrap_or(&workspace.source)
        .to_string_lossy()
        .into_owned();
    CommandSpec::new(program, &workspace.workdir)
}
