use crate::error::{Result, SweepMeError};
use crate::git::CommitInfo;
use crate::release::ReleaseError;
use git2::{BranchType, ErrorCode, Oid, Repository as Git2Repo, Sort};
use std::path::Path;

/// Wrapper around git2::Repository with our trait interface
pub struct Git2Repository {
    repo: Git2Repo,
}

impl Git2Repository {
    /// Open or discover a git repository
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Git2Repo::discover(path)?;

        Ok(Git2Repository { repo })
    }

    /// Create from existing git2::Repository
    pub fn from_git2(repo: Git2Repo) -> Self {
        Git2Repository { repo }
    }

    fn branch_target(&self, name: &str, kind: BranchType) -> Result<Option<Oid>> {
        match self.repo.find_branch(name, kind) {
            Ok(branch) => Ok(branch.get().target()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn commit_info(&self, oid: Oid) -> Result<CommitInfo> {
        let commit = self.repo.find_commit(oid)?;

        let message = commit.message().unwrap_or("(empty message)").to_string();

        let author = commit.author().name().unwrap_or("unknown").to_string();

        Ok(CommitInfo {
            oid,
            hash: oid.to_string(),
            message,
            author,
            parents: commit.parent_ids().collect(),
        })
    }
}

fn credentials(
    username_from_url: Option<&str>,
    allowed_types: git2::CredentialType,
) -> std::result::Result<git2::Cred, git2::Error> {
    let username = username_from_url.unwrap_or("git");

    if allowed_types.contains(git2::CredentialType::SSH_KEY) {
        if let Some(home) = dirs::home_dir() {
            for key in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                let path = home.join(".ssh").join(key);
                if path.exists() {
                    if let Ok(cred) = git2::Cred::ssh_key(username, None, &path, None) {
                        return Ok(cred);
                    }
                }
            }
        }

        if let Ok(cred) = git2::Cred::ssh_key_from_agent(username) {
            return Ok(cred);
        }
    }

    git2::Cred::default()
}

impl super::Repository for Git2Repository {
    fn resolve_branch(&self, remote: &str, branch: &str) -> Result<Oid> {
        let tracking = format!("{}/{}", remote, branch);
        if let Some(oid) = self.branch_target(&tracking, BranchType::Remote)? {
            return Ok(oid);
        }
        if let Some(oid) = self.branch_target(branch, BranchType::Local)? {
            return Ok(oid);
        }
        Err(ReleaseError::UnknownBranch {
            branch: branch.to_string(),
        }
        .into())
    }

    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        Ok(self.repo.graph_descendant_of(descendant, ancestor)?)
    }

    fn merge_base(&self, one: Oid, two: Oid) -> Result<Option<Oid>> {
        match self.repo.merge_base(one, two) {
            Ok(oid) => Ok(Some(oid)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_commits_between(&self, from_oid: Oid, to_oid: Oid) -> Result<Vec<CommitInfo>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        revwalk.push(to_oid)?;
        if !from_oid.is_zero() {
            revwalk.hide(from_oid)?;
        }

        revwalk
            .map(|oid| self.commit_info(oid?))
            .collect()
    }

    fn find_tag_oid(&self, tag_name: &str) -> Result<Option<Oid>> {
        let reference_name = format!("refs/tags/{}", tag_name);

        match self.repo.find_reference(&reference_name) {
            Ok(reference) => {
                let oid = reference.peel(git2::ObjectType::Any)?.id();
                Ok(Some(oid))
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(SweepMeError::Git(e)),
        }
    }

    fn fetch_from_remote(&self, remote: &str, branches: &[&str]) -> Result<()> {
        let mut remote_handle = self.repo.find_remote(remote)?;

        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(|_url, username_from_url, allowed_types| {
            credentials(username_from_url, allowed_types)
        });

        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);

        let refspecs: Vec<String> = branches
            .iter()
            .map(|branch| format!("+refs/heads/{0}:refs/remotes/{1}/{0}", branch, remote))
            .collect();
        remote_handle.fetch(&refspecs, Some(&mut fetch_options), None)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::Repository;
    use tempfile::TempDir;

    fn commit(repo: &Git2Repo, parents: &[Oid], message: &str) -> Oid {
        let signature = git2::Signature::now("Test", "test@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let parents: Vec<git2::Commit> = parents
            .iter()
            .map(|oid| repo.find_commit(*oid).unwrap())
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(None, &signature, &signature, message, &tree, &parent_refs)
            .unwrap()
    }

    #[test]
    fn test_graph_queries() {
        let dir = TempDir::new().unwrap();
        let raw = Git2Repo::init(dir.path()).unwrap();

        let root = commit(&raw, &[], "root");
        let left = commit(&raw, &[root], "left");
        let right = commit(&raw, &[root], "right");
        let merge = commit(&raw, &[left, right], "merge");
        raw.branch("main", &raw.find_commit(left).unwrap(), true)
            .unwrap();

        let repo = Git2Repository::from_git2(raw);
        assert_eq!(repo.resolve_branch("origin", "main").unwrap(), left);
        assert!(repo.resolve_branch("origin", "missing").is_err());
        assert!(repo.is_ancestor(root, merge).unwrap());
        assert!(repo.is_ancestor(left, left).unwrap());
        assert!(!repo.is_ancestor(left, right).unwrap());
        assert_eq!(repo.merge_base(left, right).unwrap(), Some(root));

        let commits = repo.get_commits_between(left, merge).unwrap();
        let hashes: Vec<Oid> = commits.iter().map(|c| c.oid).collect();
        assert_eq!(hashes, vec![right, merge]);
        assert!(commits[1].is_merge());
        assert_eq!(commits[1].merged_parents(), &[right]);
    }

    #[test]
    fn test_tags() {
        let dir = TempDir::new().unwrap();
        let raw = Git2Repo::init(dir.path()).unwrap();
        let root = commit(&raw, &[], "root");
        raw.tag_lightweight("v1.0.0", &raw.find_object(root, None).unwrap(), false)
            .unwrap();

        let repo = Git2Repository::from_git2(raw);
        assert_eq!(repo.find_tag_oid("v1.0.0").unwrap(), Some(root));
        assert_eq!(repo.find_tag_oid("v2.0.0").unwrap(), None);
    }
}
