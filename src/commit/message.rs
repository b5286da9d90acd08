//! Commit message styles and rendering.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::SemanticCategory;

/// How the subject line is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitStyle {
    /// `type(scope): summary`
    #[default]
    Conventional,
    /// `Summary`, capitalized, no type prefix.
    Plain,
}

impl fmt::Display for CommitStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitStyle::Conventional => write!(f, "conventional"),
            CommitStyle::Plain => write!(f, "plain"),
        }
    }
}

impl std::str::FromStr for CommitStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conventional" => Ok(Self::Conventional),
            "plain" => Ok(Self::Plain),
            _ => Err(format!("Unknown commit style: {s} (expected conventional or plain)")),
        }
    }
}

/// Build the subject line and clip it to `max_len` characters.
pub fn format_subject(
    style: CommitStyle,
    commit_type: SemanticCategory,
    scope: Option<&str>,
    breaking: bool,
    summary: &str,
    max_len: usize,
) -> String {
    let subject = match style {
        CommitStyle::Conventional => {
            let scope = scope.map(|s| format!("({s})")).unwrap_or_default();
            let bang = if breaking { "!" } else { "" };
            format!("{commit_type}{scope}{bang}: {summary}")
        }
        CommitStyle::Plain => capitalize(summary),
    };
    truncate_subject(&subject, max_len)
}

/// Clip to `max_len` characters, ending with an ellipsis when cut.
pub fn truncate_subject(subject: &str, max_len: usize) -> String {
    if subject.chars().count() <= max_len {
        return subject.to_string();
    }
    let mut clipped: String = subject.chars().take(max_len.saturating_sub(1)).collect();
    clipped.truncate(clipped.trim_end().len());
    clipped.push('…');
    clipped
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Join subject and body paragraphs the way git expects.
pub fn render_message(subject: &str, paragraphs: &[String]) -> String {
    let mut parts = vec![subject.to_string()];
    for paragraph in paragraphs.iter().filter(|p| !p.trim().is_empty()) {
        parts.push(String::new());
        parts.push(paragraph.trim_end().to_string());
    }
    parts.join("\n")
}
