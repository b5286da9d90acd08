//! Release tag lookup for version suggestions.

use std::collections::HashMap;

use git2::{Oid, Repository, Sort};
use semver::Version;
use tracing::{debug, warn};

use crate::error::RepoError;

/// A tag that parsed as a stable release version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTag {
    pub name: String,
    /// Commit the tag points at (annotated tags are peeled).
    pub target: Oid,
    pub version: Version,
}

/// Parse `v1.2.3` or `1.2.3` into a version.
pub fn version_from_tag(tag_name: &str) -> Option<Version> {
    let raw = tag_name.strip_prefix('v').unwrap_or(tag_name);
    Version::parse(raw).ok()
}

/// Strict `X.Y.Z` form with an optional `v`, no pre-release or build suffix.
fn is_stable_release(name: &str) -> bool {
    let raw = name.strip_prefix('v').unwrap_or(name);
    let parts: Vec<&str> = raw.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// All stable release tags in the repository, in no particular order.
pub fn release_tags(repo: &Repository) -> Result<Vec<ReleaseTag>, RepoError> {
    let mut tags = Vec::new();
    repo.tag_foreach(|oid, name_bytes| {
        let Ok(full) = std::str::from_utf8(name_bytes) else {
            warn!("Skipping tag {} with a non UTF-8 name", oid);
            return true;
        };
        let name = full.strip_prefix("refs/tags/").unwrap_or(full);
        if !is_stable_release(name) {
            return true;
        }
        let Some(version) = version_from_tag(name) else {
            return true;
        };
        // Lightweight tags point straight at the commit.
        let target = repo.find_tag(oid).map(|t| t.target_id()).unwrap_or(oid);
        tags.push(ReleaseTag {
            name: name.to_string(),
            target,
            version,
        });
        true
    })
    .map_err(RepoError::RevwalkError)?;
    Ok(tags)
}

/// Highest stable release tag on the nearest tagged ancestor of HEAD.
pub fn latest_reachable_release(repo: &Repository) -> Result<Option<ReleaseTag>, RepoError> {
    let Some(head) = repo.head().ok().and_then(|h| h.target()) else {
        return Ok(None);
    };

    let mut by_commit: HashMap<Oid, Vec<ReleaseTag>> = HashMap::new();
    for tag in release_tags(repo)? {
        by_commit.entry(tag.target).or_default().push(tag);
    }
    if by_commit.is_empty() {
        debug!("No release tags in repository");
        return Ok(None);
    }

    let mut revwalk = repo.revwalk().map_err(RepoError::RevwalkError)?;
    revwalk.push(head).map_err(RepoError::RevwalkError)?;
    revwalk
        .set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
        .map_err(RepoError::RevwalkError)?;

    for oid in revwalk {
        let oid = oid.map_err(RepoError::RevwalkError)?;
        if let Some(candidates) = by_commit.get(&oid)
            && let Some(tag) = candidates.iter().max_by(|a, b| a.version.cmp(&b.version))
        {
            debug!(tag = %tag.name, "Found latest reachable release tag");
            return Ok(Some(tag.clone()));
        }
    }
    Ok(None)
}
