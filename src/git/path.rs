//! Repository path validation.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use git2::{ErrorCode, Repository};

use crate::error::RepoError;

/// Validate a caller-supplied repository path and return its canonical form.
///
/// Rejects empty paths, NUL bytes and `..` segments before touching the
/// filesystem. When `allowed_root` is set, the canonical path must sit
/// inside it (symlinks are resolved first).
pub fn validate_repo_path(raw: &Path, allowed_root: Option<&Path>) -> Result<PathBuf, RepoError> {
    let display = raw.to_string_lossy().into_owned();

    if display.trim().is_empty() {
        return Err(RepoError::PathValidation {
            path: display,
            reason: "path is empty".to_string(),
        });
    }
    if display.contains('\0') {
        return Err(RepoError::PathValidation {
            path: display,
            reason: "path contains a NUL byte".to_string(),
        });
    }
    if raw.components().any(|c| c == Component::ParentDir) {
        return Err(RepoError::PathEscapeDetected {
            path: raw.to_path_buf(),
            detail: "contains a '..' segment".to_string(),
        });
    }

    let canonical = raw.canonicalize().map_err(|e| RepoError::PathValidation {
        path: display.clone(),
        reason: match e.kind() {
            ErrorKind::NotFound => "does not exist".to_string(),
            _ => e.to_string(),
        },
    })?;
    if !canonical.is_dir() {
        return Err(RepoError::PathValidation {
            path: display,
            reason: "not a directory".to_string(),
        });
    }

    if let Some(root) = allowed_root {
        let root = root.canonicalize().map_err(|e| RepoError::PathValidation {
            path: root.to_string_lossy().into_owned(),
            reason: format!("workspace root is unusable: {e}"),
        })?;
        if !canonical.starts_with(&root) {
            return Err(RepoError::PathEscapeDetected {
                path: canonical,
                detail: format!("resolves outside {}", root.display()),
            });
        }
    }

    Ok(canonical)
}

/// Open the repository rooted exactly at `path`, without searching parents.
pub fn open_repository(path: &Path) -> Result<Repository, RepoError> {
    let repo = Repository::open(path).map_err(|e| match e.code() {
        ErrorCode::NotFound => RepoError::NotAVersionedDirectory(path.to_path_buf()),
        _ => RepoError::OpenRepository(e),
    })?;
    if repo.is_bare() {
        return Err(RepoError::BareRepository);
    }
    Ok(repo)
}
