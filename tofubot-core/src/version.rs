//! Release-line version names such as `v1.7`.
//!
//! Only single-digit major and minor components are accepted. A `v1.10`
//! release line would need this pattern widened first.

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v[0-9]\.[0-9]$").expect("version pattern is a valid regex"));

/// Prefix some branch-creation refs carry in front of the version name.
pub const BRANCH_REF_PREFIX: &str = "branch/";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{0}` is not a version branch name (expected vX.Y)")]
pub struct VersionError(pub String);

/// A validated version branch name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version(String);

impl Version {
    pub fn parse(candidate: &str) -> Result<Self, VersionError> {
        if VERSION_PATTERN.is_match(candidate) {
            Ok(Self(candidate.to_string()))
        } else {
            Err(VersionError(candidate.to_string()))
        }
    }

    /// Extract the version from a created ref, ignoring a leading `branch/`.
    pub fn from_branch_ref(git_ref: &str) -> Option<Self> {
        let name = git_ref.strip_prefix(BRANCH_REF_PREFIX).unwrap_or(git_ref);
        Self::parse(name).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_accepts_single_digit_versions() {
        for ok in ["v0.0", "v1.2", "v9.9"] {
            assert_eq!(Version::parse(ok).unwrap().as_str(), ok);
        }
    }

    #[test]
    fn test_rejects_malformed_versions() {
        for bad in [
            "", "v1", "1.2", "v1.2.3", "v10.1", "v1.10", "V1.2", "v1x2", " v1.2", "v1.2 ", "vX.Y",
        ] {
            assert!(Version::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_from_branch_ref() {
        assert_eq!(
            Version::from_branch_ref("branch/v1.2"),
            Some(Version::parse("v1.2").unwrap())
        );
        assert_eq!(
            Version::from_branch_ref("v1.6"),
            Some(Version::parse("v1.6").unwrap())
        );
        assert_eq!(Version::from_branch_ref("branch/main"), None);
        assert_eq!(Version::from_branch_ref("feature/v1.2"), None);
    }

    fn matches_by_hand(s: &str) -> bool {
        let b = s.as_bytes();
        b.len() == 4 && b[0] == b'v' && b[1].is_ascii_digit() && b[2] == b'.' && b[3].is_ascii_digit()
    }

    proptest! {
        #[test]
        fn parse_accepts_exactly_the_version_shape(s in "\\PC{0,8}") {
            prop_assert_eq!(Version::parse(&s).is_ok(), matches_by_hand(&s));
        }

        #[test]
        fn parse_accepts_every_generated_version(major in 0u8..10, minor in 0u8..10) {
            let s = format!("v{major}.{minor}");
            prop_assert_eq!(Version::parse(&s).map(|v| v.to_string()), Ok(s));
        }
    }
}
