//! Git operations abstraction layer
//!
//! This module provides a trait-based abstraction over the Git queries the
//! release checks need, allowing for multiple implementations including real
//! Git repositories and mock implementations for testing.
//!
//! # Overview
//!
//! The primary abstraction is the [Repository] trait. The concrete
//! implementations include:
//!
//! - [repository::Git2Repository]: A real implementation using the `git2` crate
//! - [mock::MockRepository]: An in-memory commit graph for testing
//!
//! # Usage
//!
//! Release checks depend on the [Repository] trait rather than concrete
//! implementations.
//!
//! ```rust
//! # use sweepme::git::Repository;
//! # fn example<R: Repository>(repo: &R) -> Result<(), Box<dyn std::error::Error>> {
//! let main = repo.resolve_branch("origin", "main")?;
//! let feature = repo.resolve_branch("origin", "feature")?;
//! let fast_forward = repo.is_ancestor(main, feature)?;
//! # Ok(())
//! # }
//! ```

pub mod mock;
pub mod repository;

pub use mock::MockRepository;
pub use repository::Git2Repository;

use crate::error::Result;
use git2::Oid;

/// Commit information for analysis
#[derive(Debug, Clone, PartialEq)]
pub struct CommitInfo {
    pub oid: Oid,
    /// The full commit hash
    pub hash: String,
    /// The commit message
    pub message: String,
    /// The commit author
    pub author: String,
    /// Parents in order; the first one is the branch the commit was made on
    pub parents: Vec<Oid>,
}

impl CommitInfo {
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// Parents that were merged in.
    pub fn merged_parents(&self) -> &[Oid] {
        self.parents.get(1..).unwrap_or(&[])
    }
}

/// Git queries used by the release checks
///
/// ## Thread Safety
///
/// Implementors must be `Send`; `git2::Repository` is not `Sync`, so the
/// trait does not ask for it.
///
/// ## Error Handling
///
/// All methods return [crate::error::Result<T>]. Implementations map
/// underlying errors (like `git2::Error`) to [crate::error::SweepMeError].
pub trait Repository: Send {
    /// Tip of a branch
    ///
    /// The remote-tracking branch `<remote>/<branch>` is preferred; the local
    /// branch is used when there is no remote-tracking one.
    ///
    /// # Returns
    /// * `Ok(Oid)` - Object ID of the branch's tip
    /// * `Err` - If neither branch exists or there is a Git error
    fn resolve_branch(&self, remote: &str, branch: &str) -> Result<Oid>;

    /// Whether `ancestor` is reachable from `descendant`
    ///
    /// A commit counts as its own ancestor.
    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool>;

    /// Best common ancestor of two commits, `None` for unrelated histories
    fn merge_base(&self, one: Oid, two: Oid) -> Result<Option<Oid>>;

    /// Commits reachable from `to_oid` but not from `from_oid`
    ///
    /// Returned in topological order, oldest first. A zero `from_oid`
    /// returns the whole history of `to_oid`.
    fn get_commits_between(&self, from_oid: Oid, to_oid: Oid) -> Result<Vec<CommitInfo>>;

    /// Find a tag by name and get its OID
    ///
    /// Handles both lightweight and annotated tags.
    ///
    /// # Returns
    /// * `Ok(Some(Oid))` - Object ID of the tag if it exists
    /// * `Ok(None)` - If the tag doesn't exist
    /// * `Err` - If there's a Git error
    fn find_tag_oid(&self, tag_name: &str) -> Result<Option<Oid>>;

    /// Fetch branches from a remote into its remote-tracking branches
    ///
    /// # Arguments
    /// * `remote` - Name of the remote (e.g., "origin", "upstream")
    /// * `branches` - Names of the branches to fetch
    fn fetch_from_remote(&self, remote: &str, branches: &[&str]) -> Result<()>;
}
