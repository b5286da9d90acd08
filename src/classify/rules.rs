//! Compiled classification rules.

use globset::GlobSet;
use regex_lite::Regex;

use crate::classify::category::SemanticCategory;
use crate::config::{ClassifierConfig, compile_globs};
use crate::error::ConfigError;

/// Path tables and token lists, compiled once and reused for every file.
#[derive(Debug, Clone)]
pub struct ClassifierRules {
    /// Checked in order; first match wins.
    path_rules: Vec<(SemanticCategory, GlobSet)>,
    pub(crate) config_paths: GlobSet,
    pub(crate) public_interface: GlobSet,
    fix_tokens: Option<Regex>,
    perf_tokens: Option<Regex>,
    style_signatures: Vec<String>,
    pub(crate) refactor_line_threshold: usize,
    pub(crate) breaking_deletion_threshold: usize,
}

impl ClassifierRules {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            path_rules: vec![
                (SemanticCategory::Test, compile_globs(&config.test_paths, false)?),
                (SemanticCategory::Ci, compile_globs(&config.ci_paths, false)?),
                (SemanticCategory::Build, compile_globs(&config.build_paths, false)?),
                (SemanticCategory::Docs, compile_globs(&config.docs_paths, false)?),
            ],
            config_paths: compile_globs(&config.config_paths, false)?,
            public_interface: compile_globs(&config.public_interface_paths, false)?,
            fix_tokens: word_regex("fix_tokens", &config.fix_tokens)?,
            perf_tokens: word_regex("perf_tokens", &config.perf_tokens)?,
            style_signatures: config.style_signatures.clone(),
            refactor_line_threshold: config.refactor_line_threshold,
            breaking_deletion_threshold: config.breaking_deletion_threshold,
        })
    }

    /// Category implied by the path alone (test, ci, build, docs).
    pub fn path_category(&self, path: &str) -> Option<SemanticCategory> {
        self.path_rules
            .iter()
            .find(|(_, globs)| globs.is_match(path))
            .map(|(category, _)| *category)
    }

    pub fn is_config_file(&self, path: &str) -> bool {
        self.config_paths.is_match(path)
    }

    pub fn is_public_interface(&self, path: &str) -> bool {
        self.public_interface.is_match(path)
    }

    pub fn has_fix_token(&self, line: &str) -> bool {
        self.fix_tokens.as_ref().is_some_and(|re| re.is_match(line))
    }

    pub fn has_perf_token(&self, line: &str) -> bool {
        self.perf_tokens.as_ref().is_some_and(|re| re.is_match(line))
    }

    pub fn is_style_signature(&self, line: &str) -> bool {
        self.style_signatures.iter().any(|s| line.contains(s.as_str()))
    }
}

/// Whole-word alternation of the given tokens; None for an empty list.
fn word_regex(name: &str, tokens: &[String]) -> Result<Option<Regex>, ConfigError> {
    if tokens.is_empty() {
        return Ok(None);
    }
    let alternation = tokens
        .iter()
        .map(|t| regex_lite::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{alternation})\b"))
        .map(Some)
        .map_err(|source| ConfigError::InvalidPattern {
            name: name.to_string(),
            source,
        })
}
