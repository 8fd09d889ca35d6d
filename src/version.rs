use std::cmp::Ordering;
use std::fmt;

use regex::Regex;

use crate::error::{Result, SweepMeError};

/// Version of this package as compiled.
pub const PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dotted numeric version of arbitrary length, e.g. `1.5.5.47`.
///
/// Comparison pads the shorter version with zeros, so `1.2` equals `1.2.0.0`.
#[derive(Debug, Clone, Eq)]
pub struct VersionTuple(Vec<u64>);

impl VersionTuple {
    pub fn new(parts: Vec<u64>) -> Self {
        VersionTuple(parts)
    }

    pub fn parts(&self) -> &[u64] {
        &self.0
    }

    /// Extracts the leading numeric part of a version string.
    ///
    /// Trailing qualifiers are disregarded: `1.2.3.4-post1` gives `1.2.3.4`.
    ///
    /// # Example
    /// ```ignore
    /// assert_eq!(VersionTuple::parse("1.5.5.47").unwrap().parts(), &[1, 5, 5, 47]);
    /// assert!(VersionTuple::parse("dev").is_err());
    /// ```
    pub fn parse(version: &str) -> Result<Self> {
        let re = Regex::new(r"^(?:\d+\.)*\d+").map_err(|e| SweepMeError::version(e.to_string()))?;
        let extracted = re
            .find(version)
            .ok_or_else(|| SweepMeError::version(format!("Cannot extract version from {}", version)))?;

        let parts = extracted
            .as_str()
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| SweepMeError::version(format!("Invalid version part: {}", part)))
            })
            .collect::<Result<Vec<u64>>>()?;

        Ok(VersionTuple(parts))
    }

    /// Version of this package.
    pub fn current() -> Result<Self> {
        Self::parse(PACKAGE_VERSION)
    }

    fn padded(&self, len: usize) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().copied().chain(std::iter::repeat(0)).take(len)
    }
}

impl PartialEq for VersionTuple {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for VersionTuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionTuple {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        self.padded(len).cmp(other.padded(len))
    }
}

impl fmt::Display for VersionTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Whether `version` is less than or equal to `current`.
pub fn is_version_reached(version: &VersionTuple, current: &VersionTuple) -> bool {
    version <= current
}

/// Builds the notice logged when a deprecated function is used.
///
/// The removal phrase reads "in the next release" once `removed_in` is
/// reached by `current`, and "in version X" before that.
pub fn deprecation_message(
    name: &str,
    removed_in: &str,
    instructions: &str,
    current: &VersionTuple,
) -> String {
    let reached = VersionTuple::parse(removed_in)
        .map(|removed| is_version_reached(&removed, current))
        .unwrap_or(true);
    let removed_phrase = if reached {
        "in the next release".to_string()
    } else {
        format!("in version {}", removed_in)
    };

    format!(
        "{}() is deprecated and will be removed {}. {}",
        name, removed_phrase, instructions
    )
}

/// Logs a deprecation notice for `name` against the package version.
pub fn deprecated(name: &str, removed_in: &str, instructions: &str) {
    let current = VersionTuple::current().unwrap_or_else(|_| VersionTuple::new(vec![0]));
    crate::logging::debug(
        &deprecation_message(name, removed_in, instructions, &current),
        false,
    );
}
