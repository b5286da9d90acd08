//! Insert a release section into CHANGELOG.md.

use std::io::Write;
use std::path::Path;

use semver::Version;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::ChangelogError;

use super::entry::ChangelogEntry;
use super::format::{CHANGELOG_HEADER, ChangelogFormat};
use super::parser::{find_insertion_point, read_changelog};

/// Write `entry` as the `version` release dated `date` (`YYYY-MM-DD`).
///
/// - Creates the file with a Keep a Changelog header if it is missing
/// - Backs up an existing file to `<name>.md.bak`
/// - Inserts after `[Unreleased]`, before the newest release
/// - Refuses a version that already has a section
///
/// The new content goes to a temp file in the same directory and is then
/// renamed over the target.
pub fn write_changelog(
    path: &Path,
    entry: &ChangelogEntry,
    version: &Version,
    date: &str,
) -> Result<(), ChangelogError> {
    let section = format_version_section(version, date, entry);

    let new_content = match read_changelog(path)? {
        Some(existing) => {
            if existing.has_version(&version.to_string()) {
                return Err(ChangelogError::VersionAlreadyExists(version.to_string()));
            }

            let backup_path = path.with_extension("md.bak");
            std::fs::copy(path, &backup_path).map_err(ChangelogError::BackupFailed)?;
            debug!(backup = %backup_path.display(), "Backed up changelog");

            let raw = &existing.raw_content;
            let at = find_insertion_point(raw);
            let mut content = String::with_capacity(raw.len() + section.len() + 2);
            content.push_str(&raw[..at]);
            if !content.is_empty() && !content.ends_with("\n\n") {
                content.push('\n');
            }
            content.push_str(&section);
            if at < raw.len() {
                content.push('\n');
            }
            content.push_str(&raw[at..]);
            content
        }
        None => {
            let mut content = CHANGELOG_HEADER.to_string();
            content.push_str(&section);
            content
        }
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(ChangelogError::WriteFailed)?;
    tmp.write_all(new_content.as_bytes())
        .map_err(ChangelogError::WriteFailed)?;
    tmp.persist(path)
        .map_err(|e| ChangelogError::WriteFailed(e.error))?;

    info!(path = %path.display(), %version, "Wrote changelog section");
    Ok(())
}

/// `## [version] - date` followed by the human-readable rendering.
fn format_version_section(version: &Version, date: &str, entry: &ChangelogEntry) -> String {
    let mut section = format!("## [{version}] - {date}\n\n");
    let body = entry.render_as(ChangelogFormat::HumanReadable);
    if body.is_empty() {
        section.push_str("No changes.\n");
    } else {
        section.push_str(&body);
    }
    section
}

/// One-line summary of what was written.
pub fn generate_summary(entry: &ChangelogEntry, version: &Version) -> String {
    let total = entry.item_count();
    if total == 0 {
        return format!("Added empty {version} section to CHANGELOG.md");
    }

    let details: Vec<String> = entry
        .groups
        .iter()
        .map(|g| format!("{}: {}", g.category, g.items.len()))
        .collect();
    let entry_word = if total == 1 { "entry" } else { "entries" };

    format!(
        "Added {total} {entry_word} ({}) under {version} in CHANGELOG.md",
        details.join(", ")
    )
}
