use crate::config::config::ToolchainConfig;
use crate::config::types::{EngineError, Result};
use crate::engine::language::Language;
use crate::judge::adapter::JudgeAdapter;
use crate::judge::languages::{c::CAdapter, cpp::CppAdapter, java::JavaAdapter, python::PythonAdapter};

/// Adapter for an external language, configured from the toolchain table
pub fn adapter_for(language: Language, toolchain: &ToolchainConfig) -> Result<Box<dyn JudgeAdapter>> {
    match language {
        Language::Python => Ok(Box::new(PythonAdapter::new(toolchain))),
        Language::C => Ok(Box::new(CAdapter::new(toolchain))),
        Language::Cpp => Ok(Box::new(CppAdapter::new(toolchain))),
        Language::Java => Ok(Box::new(JavaAdapter::new(toolchain))),
        Language::JavaScript => Err(EngineError::Config(format!(
            "no subprocess adapter for in-process language: {language}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_external_language_has_an_adapter() {
        let toolchain = ToolchainConfig::default();
        for language in Language::ALL.into_iter().filter(|l| !l.is_in_process()) {
            let adapter = adapter_for(language, &toolchain).unwrap();
            assert_eq!(adapter.language(), language);
        }
    }

    #[test]
    fn script_has_no_subprocess_adapter() {
        assert!(adapter_for(Language::JavaScript, &ToolchainConfig::default()).is_err());
    }
}
