//! Repository snapshots, diff collection, tags and history on real repos.

mod common;

use std::path::Path;

use common::TestRepo;
use ferry::git::{
    ChangeKind, Git2Provider, VcsProvider, collect_changes, latest_reachable_release,
};
use semver::Version;

#[test]
fn test_status_lists_are_sorted_and_separated() {
    let repo = TestRepo::with_initial_commit();
    repo.write("b.txt", "b\n");
    repo.write("a.txt", "a\n");
    repo.stage("b.txt");
    repo.write("README.md", "# Project\n\nChanged.\n");

    let snapshot = Git2Provider::default().status(repo.path()).unwrap();
    assert!(!snapshot.clean);
    assert_eq!(snapshot.branch, "main");
    assert!(!snapshot.detached);
    assert_eq!(snapshot.staged, vec!["b.txt"]);
    assert_eq!(snapshot.unstaged, vec!["README.md"]);
    assert_eq!(snapshot.untracked, vec!["a.txt"]);
    assert!(snapshot.conflicted.is_empty());
    assert_eq!(snapshot.branches, vec!["main"]);
    assert_eq!(snapshot.head, Some(repo.head().to_string()));
}

#[test]
fn test_snapshot_without_upstream_counts_all_commits_ahead() {
    let repo = TestRepo::with_initial_commit();
    repo.write("src/a.rs", "fn a() {}\n");
    repo.commit_all("feat: a");
    repo.add_remote("origin", "https://example.invalid/repo.git");

    let snapshot = Git2Provider::default().status(repo.path()).unwrap();
    assert_eq!(snapshot.ahead, 2);
    assert_eq!(snapshot.behind, 0);
    assert!(!snapshot.diverged);
    assert_eq!(snapshot.upstream, None);
    assert_eq!(snapshot.remotes.len(), 1);
    assert_eq!(snapshot.remotes[0].name, "origin");
    assert_eq!(
        snapshot.remotes[0].push_url.as_deref(),
        Some("https://example.invalid/repo.git")
    );
}

#[test]
fn test_detached_head_snapshot() {
    let repo = TestRepo::with_initial_commit();
    repo.repo.set_head_detached(repo.head()).unwrap();

    let snapshot = Git2Provider::default().status(repo.path()).unwrap();
    assert!(snapshot.detached);
    assert_eq!(snapshot.branch, "HEAD");
    assert_eq!(snapshot.ahead, 0);
}

#[test]
fn test_unborn_repository_reports_new_files() {
    let repo = TestRepo::new();
    repo.write("main.rs", "fn main() {}\n");

    let provider = Git2Provider::default();
    let snapshot = provider.status(repo.path()).unwrap();
    assert_eq!(snapshot.branch, "main");
    assert_eq!(snapshot.head, None);
    assert_eq!(snapshot.untracked, vec!["main.rs"]);

    let changes = provider.diff_stats(repo.path()).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, ChangeKind::Added);
    assert_eq!(changes[0].insertions, 1);
    assert!(provider.log(repo.path(), 5).unwrap().is_empty());
}

#[test]
fn test_staged_rename_is_detected() {
    let repo = TestRepo::new();
    let body: String = (0..40).map(|i| format!("line {i}\n")).collect();
    repo.write("src/old_name.rs", &body);
    repo.commit_all("feat: initial");

    std::fs::rename(
        repo.path().join("src/old_name.rs"),
        repo.path().join("src/new_name.rs"),
    )
    .unwrap();
    let mut index = repo.repo.index().unwrap();
    index.remove_path(Path::new("src/old_name.rs")).unwrap();
    index.add_path(Path::new("src/new_name.rs")).unwrap();
    index.write().unwrap();

    let changes = collect_changes(&repo.repo).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, ChangeKind::Renamed);
    assert_eq!(changes[0].path, "src/new_name.rs");
    assert_eq!(changes[0].old_path.as_deref(), Some("src/old_name.rs"));
    assert!(changes[0].staged);
}

#[test]
fn test_modified_file_hunks_carry_line_numbers() {
    let repo = TestRepo::new();
    repo.write("notes.txt", "one\ntwo\nthree\n");
    repo.commit_all("docs: notes");
    repo.write("notes.txt", "one\n2\nthree\nfour\n");

    let changes = collect_changes(&repo.repo).unwrap();
    let change = &changes[0];
    assert_eq!(change.kind, ChangeKind::Modified);
    assert_eq!(change.insertions, 2);
    assert_eq!(change.deletions, 1);

    let added: Vec<_> = change
        .added_lines()
        .map(|l| (l.content.as_str(), l.new_lineno))
        .collect();
    assert_eq!(added, vec![("2", Some(2)), ("four", Some(4))]);
    let removed: Vec<_> = change.removed_lines().map(|l| l.content.as_str()).collect();
    assert_eq!(removed, vec!["two"]);
}

#[test]
fn test_latest_release_ignores_prereleases_and_unreachable_tags() {
    let repo = TestRepo::with_initial_commit();
    let first = repo.head();
    repo.tag_lightweight("v0.9.0", first);
    repo.tag_lightweight("v1.0.0", first);

    repo.write("src/a.rs", "fn a() {}\n");
    let second = repo.commit_all("feat: a");
    repo.tag_lightweight("v1.1.0-rc.1", second);
    repo.tag_lightweight("nightly", second);

    let elsewhere = repo.commit_off_head(second, "x.txt", "x\n", "side");
    repo.tag_lightweight("v9.0.0", elsewhere);

    let latest = latest_reachable_release(&repo.repo).unwrap().unwrap();
    assert_eq!(latest.name, "v1.0.0");
    assert_eq!(latest.version, Version::new(1, 0, 0));
    assert_eq!(latest.target, first);
}

#[test]
fn test_log_parses_conventional_headers() {
    let repo = TestRepo::with_initial_commit();
    repo.write("src/api.rs", "pub fn v2() {}\n");
    repo.commit_all("feat(api)!: replace v1 endpoints");
    repo.write("src/api.rs", "pub fn v2() { }\n");
    repo.commit_all("Tidy whitespace");

    let log = Git2Provider::default().log(repo.path(), 2).unwrap();
    assert_eq!(log.len(), 2);

    assert_eq!(log[0].summary, "Tidy whitespace");
    assert_eq!(log[0].commit_type, None);

    assert_eq!(log[1].scope.as_deref(), Some("api"));
    assert!(log[1].breaking);
    assert_eq!(log[1].author, "Test User");
}
