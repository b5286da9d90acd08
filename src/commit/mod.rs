//! Commit planning: message styles and plan synthesis.

pub mod message;
pub mod plan;

pub use message::{CommitStyle, format_subject, render_message, truncate_subject};
pub use plan::{CommitPlan, detect_scope, synthesize};
