//! Shared test utilities for integration tests.
//!
//! Not all functions are used by every test file, but they're shared across tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use git2::{Oid, Repository, RepositoryInitOptions, Signature};

use ferry::error::RepoError;
use ferry::git::{
    Author, CommitReceipt, Divergence, FileChange, LogEntry, PullReceipt, PullStrategy,
    PushReceipt, PushRequest, ReleaseTag, RepoSnapshot, VcsProvider,
};

/// A test git repository builder for integration tests.
pub struct TestRepo {
    pub dir: tempfile::TempDir,
    pub repo: Repository,
}

impl TestRepo {
    /// Empty repository on branch `main` with a local identity configured.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir.path(), &opts).expect("Failed to init git repo");

        let mut config = repo.config().expect("Failed to open repo config");
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();

        Self { dir, repo }
    }

    /// Repository with one commit containing README.md.
    pub fn with_initial_commit() -> Self {
        let repo = Self::new();
        repo.write("README.md", "# Project\n");
        repo.commit_all("chore: initial commit");
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn canonical_path(&self) -> PathBuf {
        self.dir.path().canonicalize().expect("Failed to canonicalize")
    }

    fn signature(&self) -> Signature<'_> {
        Signature::now("Test User", "test@example.com").expect("Failed to create signature")
    }

    /// Write a file relative to the repository root, creating parent dirs.
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, content).expect("Failed to write file");
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.dir.path().join(rel)).expect("Failed to remove file");
    }

    /// Add one path to the index.
    pub fn stage(&self, rel: &str) {
        let mut index = self.repo.index().expect("Failed to get index");
        index.add_path(Path::new(rel)).expect("Failed to add file");
        index.write().expect("Failed to write index");
    }

    /// Stage everything in the working tree and commit on HEAD.
    pub fn commit_all(&self, message: &str) -> Oid {
        let mut index = self.repo.index().expect("Failed to get index");
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .expect("Failed to add files");
        index
            .update_all(["*"].iter(), None)
            .expect("Failed to update index");
        index.write().expect("Failed to write index");
        let tree_id = index.write_tree().expect("Failed to write tree");
        let tree = self.repo.find_tree(tree_id).expect("Failed to find tree");

        let sig = self.signature();
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .expect("Failed to create commit")
    }

    /// Commit a file on top of `parent` without moving HEAD or touching the
    /// working tree. Used to fake commits that only exist on a remote.
    pub fn commit_off_head(&self, parent: Oid, file: &str, content: &str, message: &str) -> Oid {
        let parent = self.repo.find_commit(parent).expect("Failed to find parent");
        let blob = self.repo.blob(content.as_bytes()).expect("Failed to write blob");

        let mut builder = self
            .repo
            .treebuilder(Some(&parent.tree().expect("Failed to read parent tree")))
            .expect("Failed to create tree builder");
        builder
            .insert(file, blob, 0o100644)
            .expect("Failed to insert blob");
        let tree_id = builder.write().expect("Failed to write tree");
        let tree = self.repo.find_tree(tree_id).expect("Failed to find tree");

        let sig = self.signature();
        self.repo
            .commit(None, &sig, &sig, message, &tree, &[&parent])
            .expect("Failed to create commit")
    }

    /// Point `refs/remotes/<remote>/<branch>` at `oid`.
    pub fn set_remote_branch(&self, remote: &str, branch: &str, oid: Oid) {
        self.repo
            .reference(
                &format!("refs/remotes/{remote}/{branch}"),
                oid,
                true,
                "test remote ref",
            )
            .expect("Failed to set remote ref");
    }

    pub fn add_remote(&self, name: &str, url: &str) {
        self.repo.remote(name, url).expect("Failed to add remote");
    }

    /// Create a lightweight tag pointing to the given OID.
    pub fn tag_lightweight(&self, name: &str, oid: Oid) {
        let obj = self.repo.find_object(oid, None).expect("Failed to find object");
        self.repo
            .tag_lightweight(name, &obj, false)
            .expect("Failed to create lightweight tag");
    }

    pub fn head(&self) -> Oid {
        self.repo
            .head()
            .expect("No HEAD")
            .target()
            .expect("HEAD is symbolic")
    }
}

/// Provider that answers divergence with a fixed value and push with a
/// scripted queue of results. Every other operation is unsupported.
pub struct ScriptedProvider {
    divergence: Divergence,
    pushes: Mutex<VecDeque<Result<PushReceipt, RepoError>>>,
    push_calls: AtomicUsize,
    divergence_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(ahead: usize, behind: usize) -> Self {
        Self {
            divergence: Divergence {
                ahead,
                behind,
                tracking_ref: Some("refs/remotes/origin/feature".to_string()),
            },
            pushes: Mutex::new(VecDeque::new()),
            push_calls: AtomicUsize::new(0),
            divergence_calls: AtomicUsize::new(0),
        }
    }

    pub fn then_push(self, result: Result<PushReceipt, RepoError>) -> Self {
        self.pushes.lock().unwrap().push_back(result);
        self
    }

    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn divergence_calls(&self) -> usize {
        self.divergence_calls.load(Ordering::SeqCst)
    }
}

fn unsupported(operation: &str) -> RepoError {
    RepoError::PathValidation {
        path: "<scripted>".to_string(),
        reason: format!("{operation} is not scripted"),
    }
}

#[async_trait]
impl VcsProvider for ScriptedProvider {
    fn status(&self, _repo: &Path) -> Result<RepoSnapshot, RepoError> {
        Err(unsupported("status"))
    }

    fn divergence(&self, _repo: &Path, _remote: &str, _branch: &str) -> Result<Divergence, RepoError> {
        self.divergence_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.divergence.clone())
    }

    fn diff_stats(&self, _repo: &Path) -> Result<Vec<FileChange>, RepoError> {
        Err(unsupported("diff_stats"))
    }

    fn stage(&self, _repo: &Path, _paths: &[String]) -> Result<(), RepoError> {
        Err(unsupported("stage"))
    }

    fn commit(&self, _repo: &Path, _message: &str, _author: &Author) -> Result<CommitReceipt, RepoError> {
        Err(unsupported("commit"))
    }

    fn default_author(&self, _repo: &Path) -> Result<Author, RepoError> {
        Err(unsupported("default_author"))
    }

    async fn push(&self, _repo: &Path, _request: &PushRequest) -> Result<PushReceipt, RepoError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.pushes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(PushReceipt::default()))
    }

    async fn pull(
        &self,
        _repo: &Path,
        _remote: &str,
        _branch: &str,
        _strategy: PullStrategy,
    ) -> Result<PullReceipt, RepoError> {
        Err(unsupported("pull"))
    }

    fn log(&self, _repo: &Path, _limit: usize) -> Result<Vec<LogEntry>, RepoError> {
        Err(unsupported("log"))
    }

    fn latest_release(&self, _repo: &Path) -> Result<Option<ReleaseTag>, RepoError> {
        Err(unsupported("latest_release"))
    }
}
