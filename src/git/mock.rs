use crate::error::{Result, SweepMeError};
use crate::git::{CommitInfo, Repository};
use crate::release::ReleaseError;
use git2::Oid;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Mock repository for testing without actual git operations
///
/// Holds a commit graph built with [`MockRepository::commit`]. Commits are
/// identified by small numbers turned into OIDs with [`MockRepository::oid`].
#[derive(Default)]
pub struct MockRepository {
    commits: HashMap<Oid, CommitInfo>,
    order: Vec<Oid>,
    tags: HashMap<String, Oid>,
    branch_heads: HashMap<String, Oid>,
    fetches: Mutex<Vec<String>>,
    fetch_error: Option<String>,
}

impl MockRepository {
    /// Create a new empty mock repository
    pub fn new() -> Self {
        Self::default()
    }

    /// OID standing for commit number `n`
    pub fn oid(n: u32) -> Oid {
        Oid::from_str(&format!("{:040x}", n)).unwrap_or_else(|_| Oid::zero())
    }

    /// Add commit `n` with the given parent commits; returns its OID
    pub fn commit(&mut self, n: u32, parents: &[u32], message: &str) -> Oid {
        let oid = Self::oid(n);
        self.commits.insert(
            oid,
            CommitInfo {
                oid,
                hash: oid.to_string(),
                message: message.to_string(),
                author: "Mock Author".to_string(),
                parents: parents.iter().map(|p| Self::oid(*p)).collect(),
            },
        );
        self.order.push(oid);
        oid
    }

    /// Add a tag pointing to an OID
    pub fn add_tag(&mut self, name: impl Into<String>, oid: Oid) {
        self.tags.insert(name.into(), oid);
    }

    /// Set a local branch head
    pub fn set_branch_head(&mut self, branch: impl Into<String>, oid: Oid) {
        self.branch_heads.insert(branch.into(), oid);
    }

    /// Set a remote-tracking branch head, e.g. `origin/main`
    pub fn set_remote_branch_head(&mut self, remote: &str, branch: &str, oid: Oid) {
        self.branch_heads
            .insert(format!("{}/{}", remote, branch), oid);
    }

    /// Make fetching fail with `message`
    pub fn fail_fetch(&mut self, message: &str) {
        self.fetch_error = Some(message.to_string());
    }

    /// `remote/branch` of every fetch request so far
    pub fn fetches(&self) -> Vec<String> {
        self.fetches
            .lock()
            .map(|fetches| fetches.clone())
            .unwrap_or_default()
    }

    fn ancestors(&self, start: Oid) -> HashSet<Oid> {
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(oid) = stack.pop() {
            if !seen.insert(oid) {
                continue;
            }
            if let Some(commit) = self.commits.get(&oid) {
                stack.extend(commit.parents.iter().copied());
            }
        }
        seen
    }

    fn position(&self, oid: &Oid) -> usize {
        self.order.iter().position(|o| o == oid).unwrap_or(0)
    }
}

impl Repository for MockRepository {
    fn resolve_branch(&self, remote: &str, branch: &str) -> Result<Oid> {
        self.branch_heads
            .get(&format!("{}/{}", remote, branch))
            .or_else(|| self.branch_heads.get(branch))
            .copied()
            .ok_or_else(|| {
                ReleaseError::UnknownBranch {
                    branch: branch.to_string(),
                }
                .into()
            })
    }

    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        Ok(self.ancestors(descendant).contains(&ancestor))
    }

    fn merge_base(&self, one: Oid, two: Oid) -> Result<Option<Oid>> {
        let first = self.ancestors(one);
        let common: Vec<Oid> = self
            .ancestors(two)
            .into_iter()
            .filter(|oid| first.contains(oid))
            .collect();

        // best bases are not ancestors of other common ancestors
        let best = common
            .iter()
            .filter(|candidate| {
                !common
                    .iter()
                    .any(|other| other != *candidate && self.ancestors(*other).contains(*candidate))
            })
            .max_by_key(|oid| self.position(oid))
            .copied();
        Ok(best)
    }

    fn get_commits_between(&self, from_oid: Oid, to_oid: Oid) -> Result<Vec<CommitInfo>> {
        let hidden = if from_oid.is_zero() {
            HashSet::new()
        } else {
            self.ancestors(from_oid)
        };

        let reachable = self.ancestors(to_oid);

        Ok(self
            .order
            .iter()
            .filter(|oid| reachable.contains(*oid) && !hidden.contains(*oid))
            .filter_map(|oid| self.commits.get(oid).cloned())
            .collect())
    }

    fn find_tag_oid(&self, tag_name: &str) -> Result<Option<Oid>> {
        Ok(self.tags.get(tag_name).copied())
    }

    fn fetch_from_remote(&self, remote: &str, branches: &[&str]) -> Result<()> {
        if let Some(message) = &self.fetch_error {
            return Err(SweepMeError::Git(git2::Error::from_str(message)));
        }
        if let Ok(mut fetches) = self.fetches.lock() {
            fetches.extend(branches.iter().map(|b| format!("{}/{}", remote, b)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> MockRepository {
        let mut repo = MockRepository::new();
        repo.commit(1, &[], "root");
        repo.commit(2, &[1], "left");
        repo.commit(3, &[1], "right");
        repo.commit(4, &[2, 3], "merge");
        repo
    }

    #[test]
    fn test_ancestry() {
        let repo = diamond();
        let oid = MockRepository::oid;
        assert!(repo.is_ancestor(oid(1), oid(4)).unwrap());
        assert!(repo.is_ancestor(oid(4), oid(4)).unwrap());
        assert!(!repo.is_ancestor(oid(2), oid(3)).unwrap());
    }

    #[test]
    fn test_merge_base() {
        let repo = diamond();
        let oid = MockRepository::oid;
        assert_eq!(repo.merge_base(oid(2), oid(3)).unwrap(), Some(oid(1)));
        assert_eq!(repo.merge_base(oid(4), oid(3)).unwrap(), Some(oid(3)));
    }

    #[test]
    fn test_commits_between() {
        let repo = diamond();
        let oid = MockRepository::oid;
        let commits = repo.get_commits_between(oid(2), oid(4)).unwrap();
        let messages: Vec<&str> = commits.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, vec!["right", "merge"]);
        assert_eq!(repo.get_commits_between(Oid::zero(), oid(4)).unwrap().len(), 4);
    }

    #[test]
    fn test_resolve_prefers_remote_tracking() {
        let mut repo = diamond();
        repo.set_branch_head("main", MockRepository::oid(2));
        assert_eq!(
            repo.resolve_branch("origin", "main").unwrap(),
            MockRepository::oid(2)
        );
        repo.set_remote_branch_head("origin", "main", MockRepository::oid(4));
        assert_eq!(
            repo.resolve_branch("origin", "main").unwrap(),
            MockRepository::oid(4)
        );
        assert!(repo.resolve_branch("origin", "dev").is_err());
    }

    #[test]
    fn test_fetch_records_and_fails() {
        let mut repo = MockRepository::new();
        repo.fetch_from_remote("origin", &["main", "dev"]).unwrap();
        assert_eq!(repo.fetches(), vec!["origin/main", "origin/dev"]);

        repo.fail_fetch("authentication required");
        assert!(repo.fetch_from_remote("origin", &["main"]).is_err());
    }
}
