//! Git operations for mirrored downstream repositories.
//!
//! Everything goes through system `git` via a [`crate::process::CommandRunner`].

mod mirror;

pub use mirror::{CommitOutcome, CommitRequest, DEFAULT_LOCAL_BRANCH, RepositoryMirror};
