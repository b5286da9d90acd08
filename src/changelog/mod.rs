//! Changelog building, parsing and writing.

pub mod entry;
pub mod format;
pub mod parser;
pub mod writer;

pub use entry::{CategoryGroup, ChangelogEntry, ChangelogItem, build, build_with_version};
pub use format::{ChangelogFormat, ChangelogStyle};
pub use parser::read_changelog;
pub use writer::{generate_summary, write_changelog};
