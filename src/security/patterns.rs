//! Secret pattern table.
//!
//! Built-in patterns are plain data; configuration can add patterns, replace
//! built-ins by name, disable them or override their severity.

use regex_lite::Regex;
use tracing::warn;

use crate::config::{PatternConfig, ScannerConfig};
use crate::error::ConfigError;
use crate::security::finding::Severity;
use crate::security::redact::shannon_entropy;

const ROTATE: &str = "Remove the value from the change, rotate the credential, and load it from the environment or a secret manager.";

/// (name, regex, severity, min_entropy, recommendation)
///
/// When a regex has a capture group, group 1 is the secret; otherwise the
/// whole match is.
const BUILTIN_PATTERNS: &[(&str, &str, Severity, Option<f64>, &str)] = &[
    (
        "private_key",
        r"-----BEGIN (?:RSA |DSA |EC |OPENSSH |PGP |ENCRYPTED )?PRIVATE KEY(?: BLOCK)?-----",
        Severity::Critical,
        None,
        "Never commit private keys. Remove the file from the change and generate a new key pair.",
    ),
    (
        "aws_access_key_id",
        r"\b((?:AKIA|ASIA|AGPA|AIDA|AROA|ANPA)[0-9A-Z]{16})\b",
        Severity::Critical,
        None,
        ROTATE,
    ),
    (
        "aws_secret_access_key",
        r#"(?i)aws[_-]?secret[_-]?access[_-]?key["']?\s*[:=]\s*["']?([A-Za-z0-9/+=]{40})"#,
        Severity::Critical,
        None,
        ROTATE,
    ),
    (
        "github_token",
        r"\b((?:ghp|gho|ghu|ghs|ghr)_[A-Za-z0-9]{36,255}|github_pat_[A-Za-z0-9_]{22,255})\b",
        Severity::Critical,
        None,
        "Revoke the token in GitHub settings and use a credential helper or CI secret instead.",
    ),
    (
        "gitlab_token",
        r"\b(glpat-[A-Za-z0-9_-]{20,})",
        Severity::Critical,
        None,
        ROTATE,
    ),
    (
        "stripe_live_key",
        r"\b((?:sk|rk)_live_[0-9A-Za-z]{10,})",
        Severity::Critical,
        None,
        "Roll the key in the Stripe dashboard and keep live keys out of source control.",
    ),
    (
        "slack_token",
        r"\b(xox[abposr]-[A-Za-z0-9-]{10,})",
        Severity::High,
        None,
        ROTATE,
    ),
    (
        "slack_webhook",
        r"(https://hooks\.slack\.com/services/[A-Za-z0-9/_]{20,})",
        Severity::High,
        None,
        "Regenerate the webhook URL and store it as a secret.",
    ),
    (
        "google_api_key",
        r"\b(AIza[0-9A-Za-z_-]{35})",
        Severity::High,
        None,
        ROTATE,
    ),
    (
        "npm_token",
        r"\b(npm_[A-Za-z0-9]{36})\b",
        Severity::High,
        None,
        ROTATE,
    ),
    (
        "connection_string_password",
        r"(?i)\b(?:postgres(?:ql)?|mysql|mongodb(?:\+srv)?|redis|amqps?)://[^:/\s]+:([^@\s]{4,})@",
        Severity::High,
        None,
        "Move the database password into an environment variable.",
    ),
    (
        "generic_secret_assignment",
        r#"(?i)(?:api[_-]?key|apikey|secret|token|passw(?:or)?d|pwd|access[_-]?key|auth[_-]?key|client[_-]?secret)[a-z0-9_-]*["']?\s*[:=]\s*["']?([A-Za-z0-9_+/=.~-]{16,})"#,
        Severity::High,
        Some(3.0),
        ROTATE,
    ),
    (
        "jwt",
        r"\b(eyJ[A-Za-z0-9_-]{10,}\.eyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,})",
        Severity::Medium,
        None,
        "Check whether this token is live; prefer fixtures generated at test time.",
    ),
];

/// A compiled secret pattern.
#[derive(Debug, Clone)]
pub struct SecretPattern {
    pub name: String,
    pub severity: Severity,
    pub recommendation: String,
    pub min_entropy: Option<f64>,
    regex: Regex,
}

impl SecretPattern {
    pub fn new(config: &PatternConfig) -> Result<Self, ConfigError> {
        let regex = Regex::new(&config.regex).map_err(|source| ConfigError::InvalidPattern {
            name: config.name.clone(),
            source,
        })?;
        Ok(Self {
            name: config.name.clone(),
            severity: config.severity,
            recommendation: config
                .recommendation
                .clone()
                .unwrap_or_else(|| ROTATE.to_string()),
            min_entropy: config.min_entropy,
            regex,
        })
    }

    /// First secret in `line` that clears the entropy floor.
    pub fn find<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.regex.captures_iter(line).find_map(|caps| {
            let secret = caps.get(1).or_else(|| caps.get(0))?.as_str();
            match self.min_entropy {
                Some(floor) if shannon_entropy(secret) < floor => None,
                _ => Some(secret),
            }
        })
    }
}

/// The built-in table as config entries.
pub fn builtin_patterns() -> Vec<PatternConfig> {
    BUILTIN_PATTERNS
        .iter()
        .map(
            |&(name, regex, severity, min_entropy, recommendation)| PatternConfig {
                name: name.to_string(),
                regex: regex.to_string(),
                severity,
                recommendation: Some(recommendation.to_string()),
                min_entropy,
            },
        )
        .collect()
}

/// Merge configuration into the built-in table and compile it.
pub fn compile_patterns(config: &ScannerConfig) -> Result<Vec<SecretPattern>, ConfigError> {
    let mut specs = builtin_patterns();

    for custom in &config.patterns {
        match specs.iter_mut().find(|p| p.name == custom.name) {
            Some(existing) => *existing = custom.clone(),
            None => specs.push(custom.clone()),
        }
    }

    for name in &config.disabled_patterns {
        if !specs.iter().any(|p| &p.name == name) {
            warn!(pattern = %name, "Disabled pattern does not exist");
        }
    }
    specs.retain(|p| !config.disabled_patterns.contains(&p.name));

    for (name, severity) in &config.severity_overrides {
        match specs.iter_mut().find(|p| &p.name == name) {
            Some(spec) => spec.severity = *severity,
            None => warn!(pattern = %name, "Severity override for unknown pattern"),
        }
    }

    specs.iter().map(SecretPattern::new).collect()
}
