//! Read an existing CHANGELOG.md with parse-changelog.

use std::path::Path;

use crate::error::ChangelogError;

/// What we need to know about a changelog before inserting a release.
#[derive(Debug)]
pub struct ParsedChangelog {
    pub has_unreleased: bool,
    /// Release versions in file order, newest first.
    pub versions: Vec<String>,
    pub raw_content: String,
}

impl ParsedChangelog {
    pub fn latest_version(&self) -> Option<&str> {
        self.versions.first().map(String::as_str)
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }
}

/// Read and parse a changelog. A missing file is `Ok(None)`.
pub fn read_changelog(path: &Path) -> Result<Option<ParsedChangelog>, ChangelogError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(ChangelogError::ReadFailed)?;
    parse_content(content).map(Some)
}

fn parse_content(content: String) -> Result<ParsedChangelog, ChangelogError> {
    // parse-changelog refuses files with no release sections; a bare header
    // is still a valid target.
    if !content.lines().any(|l| l.starts_with("## ")) {
        return Ok(ParsedChangelog {
            has_unreleased: false,
            versions: Vec::new(),
            raw_content: content,
        });
    }

    let changelog =
        parse_changelog::parse(&content).map_err(|e| ChangelogError::ParseFailed(e.to_string()))?;

    let mut has_unreleased = false;
    let mut versions = Vec::new();
    for (title, _) in changelog.iter() {
        if title.eq_ignore_ascii_case("unreleased") {
            has_unreleased = true;
        } else if !title.is_empty() {
            versions.push(extract_version_from_title(title));
        }
    }

    Ok(ParsedChangelog {
        has_unreleased,
        versions,
        raw_content: content,
    })
}

/// "[1.2.3] - 2024-01-01" -> "1.2.3"
fn extract_version_from_title(title: &str) -> String {
    let title = title.trim();

    if let Some(rest) = title.strip_prefix('[')
        && let Some(end) = rest.find(']')
    {
        return rest[..end].to_string();
    }

    if let Some(dash_pos) = title.find(" - ") {
        return title[..dash_pos].trim().to_string();
    }

    title.to_string()
}

/// Byte offset for a new release section: after the header and after any
/// `[Unreleased]` section.
pub fn find_insertion_point(content: &str) -> usize {
    let mut offset = 0;
    let mut in_unreleased = false;

    for line in content.split_inclusive('\n') {
        if line.starts_with("## ") {
            if in_unreleased {
                return offset;
            }
            if line.to_lowercase().contains("unreleased") {
                in_unreleased = true;
            } else {
                return offset;
            }
        }
        offset += line.len();
    }

    content.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_version_with_brackets() {
        assert_eq!(extract_version_from_title("[1.2.3] - 2024-01-01"), "1.2.3");
    }

    #[test]
    fn test_extract_version_without_brackets() {
        assert_eq!(extract_version_from_title("1.2.3 - 2024-01-01"), "1.2.3");
    }

    #[test]
    fn test_find_insertion_point_header_only() {
        let content = "# Changelog\n\nSome header text.\n";
        assert_eq!(find_insertion_point(content), content.len());
    }

    #[test]
    fn test_find_insertion_point_after_unreleased() {
        let content = "# Changelog\n\n## [Unreleased]\n\n- Some change\n\n## [1.0.0] - 2024-01-01\n";
        let pos = find_insertion_point(content);
        assert!(content[pos..].starts_with("## [1.0.0]"));
    }

    #[test]
    fn test_find_insertion_point_before_first_release() {
        let content = "# Changelog\n\n## [1.0.0] - 2024-01-01\n\n- Initial\n";
        let pos = find_insertion_point(content);
        assert!(content[pos..].starts_with("## [1.0.0]"));
    }

    #[test]
    fn test_parse_lists_versions_newest_first() {
        let content = "# Changelog\n\n## [Unreleased]\n\n- pending\n\n## [1.1.0] - 2024-02-01\n\n- b\n\n## [1.0.0] - 2024-01-01\n\n- a\n";
        let parsed = parse_content(content.to_string()).unwrap();
        assert!(parsed.has_unreleased);
        assert_eq!(parsed.versions, vec!["1.1.0", "1.0.0"]);
        assert_eq!(parsed.latest_version(), Some("1.1.0"));
        assert!(parsed.has_version("1.0.0"));
        assert!(!parsed.has_version("2.0.0"));
    }

    #[test]
    fn test_parse_header_only() {
        let parsed = parse_content("# Changelog\n".to_string()).unwrap();
        assert!(parsed.versions.is_empty());
        assert!(!parsed.has_unreleased);
    }
}
