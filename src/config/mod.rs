//! Layered TOML configuration.
//!
//! Resolution order: an explicit `--config` path, then `FERRY_CONFIG`, then
//! `<repo>/.ferry.toml`, then built-in defaults. Every section is optional
//! and missing keys fall back to their defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::commit::CommitStyle;
use crate::error::ConfigError;
use crate::git::Author;
use crate::security::Severity;

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "FERRY_CONFIG";

/// Per-repository config file name.
pub const REPO_CONFIG_FILE: &str = ".ferry.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub general: GeneralConfig,
    pub author: Option<Author>,
    pub push: PushConfig,
    pub scanner: ScannerConfig,
    pub classifier: ClassifierConfig,
    pub commit: CommitConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralConfig {
    pub default_remote: String,
    /// When set, repository paths must resolve inside this directory.
    pub workspace_root: Option<PathBuf>,
    pub commit_style: CommitStyle,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_remote: "origin".to_string(),
            workspace_root: None,
            commit_style: CommitStyle::Conventional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PushConfig {
    /// Branch names (or globs) that refuse force pushes.
    pub protected_branches: Vec<String>,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub deadline_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            protected_branches: ["main", "master", "production", "release"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
            deadline_secs: 120,
        }
    }
}

impl PushConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// A user-supplied secret pattern. A pattern whose name matches a built-in
/// one replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternConfig {
    pub name: String,
    pub regex: String,
    pub severity: Severity,
    #[serde(default)]
    pub recommendation: Option<String>,
    /// Minimum Shannon entropy (bits per char) of the captured secret.
    #[serde(default)]
    pub min_entropy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerConfig {
    pub max_file_bytes: u64,
    pub blocked_paths: Vec<String>,
    pub patterns: Vec<PatternConfig>,
    pub disabled_patterns: Vec<String>,
    pub severity_overrides: BTreeMap<String, Severity>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 1024 * 1024,
            blocked_paths: strings(&[
                "**/*.pem",
                "**/*.key",
                "**/*.p12",
                "**/*.pfx",
                "**/*.keystore",
                "**/*.jks",
                "**/.env",
                "**/.env.*",
                "**/id_rsa",
                "**/id_dsa",
                "**/id_ecdsa",
                "**/id_ed25519",
                "**/.netrc",
                "**/credentials.json",
                "**/*credentials*.json",
                "**/*secret*.json",
                "**/service-account*.json",
            ]),
            patterns: Vec::new(),
            disabled_patterns: Vec::new(),
            severity_overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierConfig {
    pub test_paths: Vec<String>,
    pub ci_paths: Vec<String>,
    pub build_paths: Vec<String>,
    pub docs_paths: Vec<String>,
    pub config_paths: Vec<String>,
    pub public_interface_paths: Vec<String>,
    /// Words in changed lines that suggest a bug fix.
    pub fix_tokens: Vec<String>,
    /// Words in added lines that suggest a performance change.
    pub perf_tokens: Vec<String>,
    /// Formatter directives ignored when deciding a change is style-only.
    pub style_signatures: Vec<String>,
    pub refactor_line_threshold: usize,
    pub breaking_deletion_threshold: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            test_paths: strings(&[
                "**/test/**",
                "**/tests/**",
                "**/__tests__/**",
                "**/spec/**",
                "**/*_test.*",
                "**/*_spec.*",
                "**/*.test.*",
                "**/*.spec.*",
                "**/test_*.py",
            ]),
            ci_paths: strings(&[
                ".github/workflows/**",
                ".gitlab-ci.yml",
                ".circleci/**",
                ".travis.yml",
                "azure-pipelines.yml",
                "Jenkinsfile",
                ".buildkite/**",
            ]),
            build_paths: strings(&[
                "**/Cargo.toml",
                "**/Cargo.lock",
                "**/package.json",
                "**/package-lock.json",
                "**/yarn.lock",
                "**/pnpm-lock.yaml",
                "**/pyproject.toml",
                "**/requirements*.txt",
                "**/go.mod",
                "**/go.sum",
                "**/Makefile",
                "**/CMakeLists.txt",
                "**/build.gradle",
                "**/pom.xml",
                "**/Dockerfile",
                "**/build.rs",
            ]),
            docs_paths: strings(&[
                "**/*.md",
                "**/*.rst",
                "**/*.adoc",
                "docs/**",
                "doc/**",
                "**/LICENSE*",
            ]),
            config_paths: strings(&[
                "**/*.toml",
                "**/*.yaml",
                "**/*.yml",
                "**/*.ini",
                "**/*.cfg",
                "**/*.conf",
                "**/.env*",
                "**/*.config.js",
                "**/*.config.ts",
            ]),
            public_interface_paths: strings(&[
                "**/lib.rs",
                "**/mod.rs",
                "**/index.js",
                "**/index.ts",
                "**/*.d.ts",
                "**/__init__.py",
                "**/api/**",
                "**/include/**",
            ]),
            fix_tokens: strings(&[
                "fix", "fixed", "bug", "if", "else", "elif", "match", "switch", "case", "catch",
                "except", "try", "throw", "raise", "panic", "Err", "Error", "error", "null",
                "nil", "None", "guard", "unwrap_or", "ok_or",
            ]),
            perf_tokens: strings(&[
                "cache",
                "cached",
                "memoize",
                "with_capacity",
                "reserve",
                "parallel",
                "par_iter",
                "lazy",
                "inline",
                "optimize",
                "optimise",
                "perf",
                "benchmark",
            ]),
            style_signatures: strings(&[
                "prettier-ignore",
                "eslint-disable",
                "eslint-enable",
                "fmt: off",
                "fmt: on",
                "fmt: skip",
                "rustfmt::skip",
                "noqa",
                "clang-format off",
                "clang-format on",
                "isort:skip",
                "pylint: disable",
            ]),
            refactor_line_threshold: 50,
            breaking_deletion_threshold: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommitConfig {
    pub max_body_bullets: usize,
    /// Share of files (percent) that must sit under one top-level
    /// directory before it becomes the commit scope.
    pub scope_share_percent: u8,
    pub max_subject_len: usize,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            max_body_bullets: 10,
            scope_share_percent: 60,
            max_subject_len: 72,
        }
    }
}

impl Config {
    /// Resolve and load configuration for a repository.
    pub fn load(explicit: Option<&Path>, repo: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
            && !path.trim().is_empty()
        {
            return Self::from_file(Path::new(&path));
        }
        if let Some(repo) = repo {
            let candidate = repo.join(REPO_CONFIG_FILE);
            if candidate.is_file() {
                return Self::from_file(&candidate);
            }
        }
        debug!("No config file found, using defaults");
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading config");
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&raw).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|source| ConfigError::ParseFailed {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges. Regexes and globs are checked when compiled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.default_remote.trim().is_empty() {
            return Err(invalid("general.default_remote", "must not be empty"));
        }
        if let Some(author) = &self.author
            && (author.name.trim().is_empty() || author.email.trim().is_empty())
        {
            return Err(invalid("author", "name and email must both be set"));
        }
        if self.push.max_attempts == 0 {
            return Err(invalid("push.max_attempts", "must be at least 1"));
        }
        if self.push.base_delay_ms > self.push.max_delay_ms {
            return Err(invalid(
                "push.base_delay_ms",
                "must not exceed push.max_delay_ms",
            ));
        }
        if self.push.deadline_secs == 0 {
            return Err(invalid("push.deadline_secs", "must be at least 1"));
        }
        if self.scanner.max_file_bytes == 0 {
            return Err(invalid("scanner.max_file_bytes", "must be positive"));
        }
        if let Some(pattern) = self
            .scanner
            .patterns
            .iter()
            .find(|p| p.min_entropy.is_some_and(|e| !(0.0..=8.0).contains(&e)))
        {
            return Err(invalid(
                "scanner.patterns.min_entropy",
                format!("{} must be between 0 and 8", pattern.name),
            ));
        }
        if self.commit.max_subject_len < 20 {
            return Err(invalid("commit.max_subject_len", "must be at least 20"));
        }
        if self.commit.scope_share_percent == 0 || self.commit.scope_share_percent > 100 {
            return Err(invalid(
                "commit.scope_share_percent",
                "must be between 1 and 100",
            ));
        }
        Ok(())
    }
}

/// Compile a list of glob patterns into one matcher.
///
/// `*` never crosses a `/`; use `**` for that.
pub fn compile_globs(patterns: &[String], case_insensitive: bool) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|source| ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| ConfigError::InvalidGlob {
        pattern: patterns.join(", "),
        source,
    })
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
