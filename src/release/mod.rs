//! Checks run before a branch is merged or a version is published.
//!
//! - [merge_check]: the history between two branches is a fast-forward and
//!   any merge commits in it come from the preceding release branch
//! - [version_check]: the package version has not been tagged yet

pub mod merge_check;
pub mod version_check;

pub use merge_check::{check_merge, MergeCheckOptions, MergeReport};
pub use version_check::{check_version_unique, tag_for_version};

use thiserror::Error;

/// Reasons a release check refuses a merge or a publication.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReleaseError {
    #[error("Branch '{branch}' not found locally or on the remote")]
    UnknownBranch { branch: String },

    #[error(
        "non-linear history: '{target}' is not an ancestor of '{source_branch}', a fast-forward merge is not possible"
    )]
    NotFastForward { target: String, source_branch: String },

    #[error(
        "'{source_branch}' contains merge commits and target branch '{target}' does not correspond to a release version"
    )]
    UntrackedTarget { target: String, source_branch: String },

    #[error("target branch '{target}' has no preceding version to merge from")]
    MissingPredecessor { target: String },

    #[error("merge commit {commit} in '{source_branch}' does not come from preceding version '{predecessor}': {reason}")]
    MergeBaseOrder {
        commit: String,
        source_branch: String,
        predecessor: String,
        reason: String,
    },

    #[error("Version {version} seems to be published already (tag '{tag}' exists)")]
    AlreadyPublished { version: String, tag: String },

    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("Invalid tag pattern '{pattern}': should have exactly one {{version}} placeholder")]
    InvalidTagPattern { pattern: String },
}
