//! Commit history with conventional-commit header parsing.

use std::sync::LazyLock;

use chrono::{DateTime, TimeZone, Utc};
use git2::{Commit, Repository, Sort};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::classify::SemanticCategory;
use crate::error::RepoError;

/// `type(scope)!: description`
static HEADER_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\w+)(?:\(([^)]+)\))?(!)?\s*:\s*").ok());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub hash: String,
    pub summary: String,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_type: Option<SemanticCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub breaking: bool,
}

impl LogEntry {
    fn from_commit(commit: &Commit<'_>) -> Self {
        let message = commit.message().unwrap_or("").to_string();
        let timestamp = Utc
            .timestamp_opt(commit.time().seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);
        let header = parse_header(&message);
        Self {
            hash: commit.id().to_string(),
            summary: message.lines().next().unwrap_or("").to_string(),
            author: commit.author().name().unwrap_or("").to_string(),
            timestamp,
            commit_type: header.commit_type,
            scope: header.scope,
            breaking: header.breaking,
            message,
        }
    }
}

/// Parsed conventional-commit header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitHeader {
    pub commit_type: Option<SemanticCategory>,
    pub scope: Option<String>,
    pub breaking: bool,
}

/// Parse the type, scope and breaking marker of a commit message.
pub fn parse_header(message: &str) -> CommitHeader {
    let first_line = message.lines().next().unwrap_or("");
    let breaking_footer =
        message.contains("BREAKING CHANGE:") || message.contains("BREAKING-CHANGE:");

    let Some(caps) = HEADER_RE.as_ref().and_then(|re| re.captures(first_line)) else {
        return CommitHeader {
            breaking: breaking_footer,
            ..CommitHeader::default()
        };
    };

    CommitHeader {
        commit_type: caps.get(1).and_then(|m| m.as_str().parse().ok()),
        scope: caps.get(2).map(|m| m.as_str().to_string()),
        breaking: caps.get(3).is_some() || breaking_footer,
    }
}

/// Most recent commits reachable from HEAD, newest first.
pub fn read_log(repo: &Repository, limit: usize) -> Result<Vec<LogEntry>, RepoError> {
    let Some(head) = repo.head().ok().and_then(|h| h.target()) else {
        return Ok(Vec::new());
    };

    let mut revwalk = repo.revwalk().map_err(RepoError::RevwalkError)?;
    revwalk
        .set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
        .map_err(RepoError::RevwalkError)?;
    revwalk.push(head).map_err(RepoError::RevwalkError)?;

    let mut entries = Vec::new();
    for oid in revwalk.take(limit) {
        let oid = oid.map_err(RepoError::RevwalkError)?;
        let commit = repo.find_commit(oid).map_err(RepoError::RevwalkError)?;
        entries.push(LogEntry::from_commit(&commit));
    }
    Ok(entries)
}
