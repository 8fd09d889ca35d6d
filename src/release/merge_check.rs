use git2::Oid;
use tracing::{debug, warn};

use super::ReleaseError;
use crate::config::ReleaseConfig;
use crate::error::Result;
use crate::git::{CommitInfo, Repository};
use crate::warning::Warning;

/// Settings of [`check_merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeCheckOptions {
    pub remote: String,
    /// Fetch the branches before comparing them
    pub fetch: bool,
    /// Release branches, newest first
    pub release_branches: Vec<String>,
}

impl Default for MergeCheckOptions {
    fn default() -> Self {
        MergeCheckOptions::from(&ReleaseConfig::default())
    }
}

impl From<&ReleaseConfig> for MergeCheckOptions {
    fn from(config: &ReleaseConfig) -> Self {
        MergeCheckOptions {
            remote: config.remote.clone(),
            fetch: true,
            release_branches: config.branches.clone(),
        }
    }
}

/// What an accepted merge brings in.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    pub target: String,
    pub source: String,
    pub target_tip: Oid,
    pub source_tip: Oid,
    /// Number of commits in `target..source`
    pub commits: usize,
    /// Merge commits in `target..source`, all from the predecessor
    pub merges: Vec<CommitInfo>,
    /// Release branch the merges come from
    pub predecessor: Option<String>,
    /// Problems the check worked around, e.g. a failed fetch
    pub warnings: Vec<Warning>,
}

impl MergeReport {
    pub fn is_linear(&self) -> bool {
        self.merges.is_empty()
    }
}

/// Release branch that precedes `target`, the next older entry of `branches`.
///
/// Fails if `target` is no release branch or the oldest one.
pub fn predecessor_of<'a>(branches: &'a [String], target: &str, source: &str) -> Result<&'a str> {
    let index = branches
        .iter()
        .position(|branch| branch == target)
        .ok_or_else(|| ReleaseError::UntrackedTarget {
            target: target.to_string(),
            source_branch: source.to_string(),
        })?;

    branches
        .get(index + 1)
        .map(|branch| branch.as_str())
        .ok_or_else(|| {
            ReleaseError::MissingPredecessor {
                target: target.to_string(),
            }
            .into()
        })
}

/// Fetches `branches`; a failure is kept as a warning and local data is used.
fn fetch<R: Repository + ?Sized>(
    repo: &R,
    remote: &str,
    branches: &[&str],
    warnings: &mut Vec<Warning>,
) {
    if let Err(e) = repo.fetch_from_remote(remote, branches) {
        let warning = Warning::FetchFailed {
            remote: remote.to_string(),
            reason: e.to_string(),
        };
        warn!("{}", warning);
        warnings.push(warning);
    }
}

/// Checks that `source` can be merged into `target` keeping the history
/// semilinear.
///
/// The target must be an ancestor of the source. Merge commits between them
/// are only accepted when the target is a release branch and every merge
/// brings in commits of the preceding release branch: merged parents are
/// reachable from the predecessor, and the source's merge base with the
/// predecessor is not older than the target's.
pub fn check_merge<R: Repository + ?Sized>(
    repo: &R,
    target: &str,
    source: &str,
    options: &MergeCheckOptions,
) -> Result<MergeReport> {
    let mut warnings = Vec::new();
    if options.fetch {
        fetch(repo, &options.remote, &[target, source], &mut warnings);
    }

    let target_tip = repo.resolve_branch(&options.remote, target)?;
    let source_tip = repo.resolve_branch(&options.remote, source)?;
    debug!(%target_tip, %source_tip, "checking merge of '{}' into '{}'", source, target);

    if !repo.is_ancestor(target_tip, source_tip)? {
        return Err(ReleaseError::NotFastForward {
            target: target.to_string(),
            source_branch: source.to_string(),
        }
        .into());
    }

    let commits = repo.get_commits_between(target_tip, source_tip)?;
    let merges: Vec<CommitInfo> = commits.iter().filter(|c| c.is_merge()).cloned().collect();

    let mut report = MergeReport {
        target: target.to_string(),
        source: source.to_string(),
        target_tip,
        source_tip,
        commits: commits.len(),
        merges: Vec::new(),
        predecessor: None,
        warnings,
    };
    if merges.is_empty() {
        return Ok(report);
    }

    let predecessor = predecessor_of(&options.release_branches, target, source)?;
    if options.fetch {
        fetch(repo, &options.remote, &[predecessor], &mut report.warnings);
    }
    let predecessor_tip = repo.resolve_branch(&options.remote, predecessor)?;

    let order_error = |commit: &CommitInfo, reason: String| ReleaseError::MergeBaseOrder {
        commit: commit.hash.clone(),
        source_branch: source.to_string(),
        predecessor: predecessor.to_string(),
        reason,
    };

    for merge in &merges {
        for parent in merge.merged_parents() {
            if !repo.is_ancestor(*parent, predecessor_tip)? {
                return Err(order_error(
                    merge,
                    format!("merged parent {} is not part of '{}'", parent, predecessor),
                )
                .into());
            }
        }
    }

    let target_base = repo.merge_base(target_tip, predecessor_tip)?;
    let source_base = repo.merge_base(source_tip, predecessor_tip)?;
    let ordered = match (target_base, source_base) {
        (Some(target_base), Some(source_base)) => repo.is_ancestor(target_base, source_base)?,
        _ => false,
    };
    if !ordered {
        return Err(order_error(
            &merges[0],
            format!(
                "merge base of '{}' and '{}' is not an ancestor of the merge base of '{}' and '{}'",
                target, predecessor, source, predecessor
            ),
        )
        .into());
    }

    report.merges = merges;
    report.predecessor = Some(predecessor.to_string());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SweepMeError;
    use crate::git::MockRepository;

    fn options() -> MergeCheckOptions {
        MergeCheckOptions {
            fetch: false,
            ..MergeCheckOptions::default()
        }
    }

    fn release_error(err: SweepMeError) -> ReleaseError {
        match err {
            SweepMeError::Release(e) => e,
            other => panic!("expected a release error, got {}", other),
        }
    }

    #[test]
    fn test_predecessor_of() {
        let branches: Vec<String> = vec!["main".into(), "1.5.6".into(), "v1.5.5.x".into()];
        assert_eq!(predecessor_of(&branches, "main", "x").unwrap(), "1.5.6");
        assert_eq!(predecessor_of(&branches, "1.5.6", "x").unwrap(), "v1.5.5.x");

        let err = predecessor_of(&branches, "v1.5.5.x", "x").unwrap_err();
        assert!(err.to_string().contains("no preceding version"));

        let err = predecessor_of(&branches, "feature", "x").unwrap_err();
        assert!(err.to_string().contains("does not correspond to a release version"));
    }

    #[test]
    fn test_linear_history() {
        let mut repo = MockRepository::new();
        let base = repo.commit(1, &[], "base");
        let tip = repo.commit(2, &[1], "feature");
        repo.set_branch_head("main", base);
        repo.set_branch_head("feature", tip);

        let report = check_merge(&repo, "main", "feature", &options()).unwrap();
        assert!(report.is_linear());
        assert_eq!(report.commits, 1);
        assert_eq!(report.predecessor, None);
    }

    #[test]
    fn test_not_fast_forward() {
        let mut repo = MockRepository::new();
        repo.commit(1, &[], "base");
        let main = repo.commit(2, &[1], "main work");
        let feature = repo.commit(3, &[1], "feature work");
        repo.set_branch_head("main", main);
        repo.set_branch_head("feature", feature);

        let err = release_error(check_merge(&repo, "main", "feature", &options()).unwrap_err());
        assert!(matches!(err, ReleaseError::NotFastForward { .. }));
    }

    #[test]
    fn test_fetch_failure_is_not_fatal() {
        let mut repo = MockRepository::new();
        let base = repo.commit(1, &[], "base");
        repo.set_branch_head("main", base);
        repo.set_branch_head("feature", base);
        repo.fail_fetch("authentication required");

        let opts = MergeCheckOptions {
            fetch: true,
            ..options()
        };
        let report = check_merge(&repo, "main", "feature", &opts).unwrap();
        assert_eq!(report.commits, 0);
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            &report.warnings[0],
            Warning::FetchFailed { remote, reason } if remote == "origin" && reason.contains("authentication required")
        ));
    }

    #[test]
    fn test_fetches_target_and_source() {
        let mut repo = MockRepository::new();
        let base = repo.commit(1, &[], "base");
        repo.set_branch_head("main", base);
        repo.set_branch_head("feature", base);

        let opts = MergeCheckOptions {
            fetch: true,
            ..options()
        };
        check_merge(&repo, "main", "feature", &opts).unwrap();
        assert_eq!(repo.fetches(), vec!["origin/main", "origin/feature"]);
    }
}
