use crate::config::types::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of supported languages. Tags parse case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Runs in the in-process sandbox
    #[default]
    JavaScript,
    Python,
    C,
    Cpp,
    Java,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::JavaScript,
        Language::Python,
        Language::C,
        Language::Cpp,
        Language::Java,
    ];

    /// Canonical tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
        }
    }

    /// Whether the language runs in-process rather than in a child process
    pub fn is_in_process(&self) -> bool {
        matches!(self, Language::JavaScript)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = EngineError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_lowercase().as_str() {
            "javascript" | "js" | "script" | "node" | "mjs" => Ok(Language::JavaScript),
            "python" | "py" | "python3" => Ok(Language::Python),
            "c" => Ok(Language::C),
            "cpp" | "c++" | "cxx" | "cc" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            _ => Err(EngineError::UnsupportedLanguage(tag.to_string())),
        }
    }
}
