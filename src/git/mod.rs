//! Repository state, diff collection and git primitives.

pub mod diff;
pub mod executor;
pub mod log;
pub mod path;
pub mod provider;
pub mod snapshot;
pub mod tags;

pub use diff::{ChangeKind, DiffHunk, DiffLine, FileChange, LineOrigin, collect_changes};
pub use executor::{PullReceipt, PullStrategy, PushReceipt, PushRequest, classify_remote_failure};
pub use log::{LogEntry, parse_header};
pub use path::{open_repository, validate_repo_path};
pub use provider::{Author, CommitReceipt, Git2Provider, VcsProvider};
pub use snapshot::{Divergence, RemoteInfo, RepoSnapshot, take_snapshot};
pub use tags::{ReleaseTag, latest_reachable_release, version_from_tag};
