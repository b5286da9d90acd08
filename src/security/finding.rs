//! Scan result types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered severity. High and critical findings block commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn is_blocking(self) -> bool {
        self >= Severity::High
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown severity: {s}")),
        }
    }
}

/// One detected secret or blocked file. The snippet is always redacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityFinding {
    pub path: String,
    /// Line in the new file; None for whole-file findings.
    pub line: Option<u32>,
    pub pattern: String,
    pub severity: Severity,
    pub snippet: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Binary,
    TooLarge,
    /// The diff hit the per-file line cap, so part of it was never read.
    Truncated,
}

/// A file the scanner did not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub findings: Vec<SecurityFinding>,
    pub skipped: Vec<SkippedFile>,
    pub scanned_files: usize,
    /// True when any finding is high or critical.
    pub blocking: bool,
}

impl ScanReport {
    pub fn blocking_findings(&self) -> impl Iterator<Item = &SecurityFinding> {
        self.findings.iter().filter(|f| f.severity.is_blocking())
    }

    /// Low and medium findings, surfaced without blocking.
    pub fn advisories(&self) -> Vec<SecurityFinding> {
        self.findings
            .iter()
            .filter(|f| !f.severity.is_blocking())
            .cloned()
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}
