use super::ReleaseError;
use crate::error::Result;
use crate::git::Repository;
use crate::version::VersionTuple;

/// Tag name for `version` following `pattern`, e.g. `v{version}` -> `v1.5.6`.
pub fn tag_for_version(pattern: &str, version: &str) -> Result<String> {
    if pattern.matches("{version}").count() != 1 {
        return Err(ReleaseError::InvalidTagPattern {
            pattern: pattern.to_string(),
        }
        .into());
    }
    Ok(pattern.replace("{version}", version))
}

/// Checks that `version` has not been published yet.
///
/// The version must start with dotted numbers, e.g. `1.5.6` or `1.5.5.47`,
/// and its tag must not exist. Returns the tag the release will get.
pub fn check_version_unique<R: Repository + ?Sized>(
    repo: &R,
    version: &str,
    tag_pattern: &str,
) -> Result<String> {
    VersionTuple::parse(version).map_err(|e| ReleaseError::InvalidVersion {
        version: version.to_string(),
        reason: e.to_string(),
    })?;

    let tag = tag_for_version(tag_pattern, version)?;
    if repo.find_tag_oid(&tag)?.is_some() {
        return Err(ReleaseError::AlreadyPublished {
            version: version.to_string(),
            tag,
        }
        .into());
    }
    Ok(tag)
}
