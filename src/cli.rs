use crate::config::config::{EngineConfig, ToolchainConfig};
use crate::engine::Engine;
use crate::sandbox::ContextExtensions;
use crate::verify::{verify_solution, Challenge, ComparisonMode};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to an execbox.json config file (default: ./execbox.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute code and print the result as JSON
    Execute {
        /// Language tag (javascript, python, c, cpp, java or an alias)
        #[arg(long, default_value = "javascript")]
        language: String,
        /// Source code as string
        #[arg(long, conflicts_with = "file")]
        code: Option<String>,
        /// Read source code from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// JSON file of context extensions for the script sandbox
        #[arg(long)]
        context: Option<PathBuf>,
    },
    /// Verify a solution against a challenge's test cases
    Verify {
        /// Solution source file
        #[arg(long)]
        file: PathBuf,
        /// Challenge JSON: { language, function_name?, cases: [{ input, expected }] }
        #[arg(long)]
        cases: PathBuf,
        /// Compare exactly instead of loosely
        #[arg(long)]
        strict: bool,
    },
    /// Check if all language toolchains are installed
    CheckDeps {
        /// Verbose output showing detailed version information
        #[arg(long)]
        verbose: bool,
    },
    /// Remove scratch entries left behind by crashed executions
    Purge {
        /// Only remove entries older than this many seconds
        #[arg(long, default_value_t = 3600)]
        max_age_secs: u64,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let mut config = EngineConfig::load_from_file(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok())?;
            config
        }
        None => EngineConfig::load_default()?,
    };

    match cli.command {
        Commands::Execute {
            language,
            code,
            file,
            context,
        } => {
            let code = match (code, file) {
                (Some(code), _) => code,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read source file {}", path.display()))?,
                (None, None) => bail!("Either --code or --file is required"),
            };
            let extensions = match context {
                Some(path) => load_extensions(&path)?,
                None => ContextExtensions::new(),
            };

            let engine = Engine::new(config)?;
            let result = engine.execute(&code, &language, &extensions);
            println!("{}", serde_json::to_string_pretty(&result)?);

            if !result.success() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Verify { file, cases, strict } => {
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read source file {}", file.display()))?;
            let challenge: Challenge = serde_json::from_str(
                &std::fs::read_to_string(&cases)
                    .with_context(|| format!("Failed to read challenge file {}", cases.display()))?,
            )
            .context("Failed to parse challenge JSON")?;
            let mode = if strict {
                ComparisonMode::Strict
            } else {
                ComparisonMode::Loose
            };

            let engine = Engine::new(config)?;
            let report = verify_solution(&engine, &challenge, &code, mode);
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !report.passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::CheckDeps { verbose } => check_language_dependencies(&config.toolchain, verbose),
        Commands::Purge { max_age_secs } => {
            let engine = Engine::new(config)?;
            let removed = engine.scratch().purge_stale(Duration::from_secs(max_age_secs))?;
            eprintln!(
                "Removed {} stale entr{} from {}",
                removed,
                if removed == 1 { "y" } else { "ies" },
                engine.scratch().path().display()
            );
            Ok(())
        }
    }
}

/// Extensions file: `{ "name": { "kind": "json" | "script", "value": ... } }`
fn load_extensions(path: &PathBuf) -> Result<ContextExtensions> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read context file {}", path.display()))?;
    serde_json::from_str(&text).context("Failed to parse context extensions JSON")
}

fn check_language_dependencies(toolchain: &ToolchainConfig, verbose: bool) -> Result<()> {
    use std::process::Command;

    println!("Checking language toolchains...");
    println!();

    let languages = [
        ("JavaScript", Vec::new()),
        ("Python", vec![(toolchain.python.as_str(), "--version")]),
        ("C", vec![(toolchain.c_compiler.as_str(), "--version")]),
        ("C++", vec![(toolchain.cpp_compiler.as_str(), "--version")]),
        (
            "Java",
            vec![
                (toolchain.java_compiler.as_str(), "-version"),
                (toolchain.java_runtime.as_str(), "-version"),
            ],
        ),
    ];

    let mut missing_languages = Vec::new();

    for (lang_name, commands) in &languages {
        let mut lang_ok = true;
        let mut versions = Vec::new();

        for (cmd, version_arg) in commands {
            match Command::new(cmd).arg(version_arg).output() {
                Ok(output) if output.status.success() => {
                    let version_info = if !output.stdout.is_empty() {
                        String::from_utf8_lossy(&output.stdout)
                    } else {
                        String::from_utf8_lossy(&output.stderr)
                    }
                    .lines()
                    .next()
                    .unwrap_or("")
                    .to_string();
                    versions.push(format!("  {} -> {}", cmd, version_info.trim()));
                }
                Ok(_) => {
                    lang_ok = false;
                    versions.push(format!("  {} -> FAILED", cmd));
                }
                Err(_) => {
                    lang_ok = false;
                    versions.push(format!("  {} -> NOT FOUND", cmd));
                }
            }
        }

        if commands.is_empty() {
            println!("{} - OK (in-process)", lang_name);
        } else if lang_ok {
            println!("{} - OK", lang_name);
        } else {
            println!("{} - MISSING", lang_name);
            missing_languages.push(*lang_name);
        }
        if verbose {
            for version in versions {
                println!("{}", version);
            }
        }
    }

    println!();

    if missing_languages.is_empty() {
        println!("All language toolchains are installed");
        Ok(())
    } else {
        println!("Missing language toolchains: {}", missing_languages.join(", "));
        std::process::exit(1);
    }
}
