//! Bisection label derivation and matching.
//!
//! Every kernel built by the controller carries a `-bisect-<short hash>`
//! suffix in its release string. The suffix is derived only from the
//! commit id, so rebuilding the same commit yields the same version.

use std::fmt;
use std::sync::LazyLock;

use regex_lite::Regex;

use crate::errors::SafetyError;

/// Marker separating the upstream release from the commit suffix.
pub const BISECT_MARKER: &str = "-bisect-";

/// Number of hex digits kept from the commit id.
pub const SHORT_COMMIT_LEN: usize = 7;

/// Loose glob used to find candidate files before the strict check.
pub const BISECT_CANDIDATE_GLOB: &str = "*bisect*";

static BISECT_VERSION_RE: LazyLock<Result<Regex, regex_lite::Error>> =
    LazyLock::new(|| Regex::new(r"^[0-9][0-9A-Za-z._+~-]*-bisect-[0-9a-f]{7,40}$"));

/// Version suffix injected into a bisection build, e.g. `-bisect-abc1234`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BisectLabel {
    short_commit: String,
}

impl BisectLabel {
    /// Derive the label from a full or abbreviated commit id.
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::Checkout`] if the id is shorter than
    /// [`SHORT_COMMIT_LEN`] or contains non-hex characters.
    pub fn from_commit(commit: &str) -> Result<Self, SafetyError> {
        let commit = commit.trim().to_ascii_lowercase();
        if commit.len() < SHORT_COMMIT_LEN || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SafetyError::Checkout {
                commit,
                reason: format!("not a hex commit id of at least {SHORT_COMMIT_LEN} digits"),
            });
        }
        Ok(Self {
            short_commit: commit[..SHORT_COMMIT_LEN].to_string(),
        })
    }

    #[must_use]
    pub fn short_commit(&self) -> &str {
        &self.short_commit
    }

    /// The `LOCALVERSION` value passed to the kernel build.
    #[must_use]
    pub fn local_version(&self) -> String {
        format!("{BISECT_MARKER}{}", self.short_commit)
    }

    /// Whether `version` carries exactly this label.
    #[must_use]
    pub fn matches_version(&self, version: &str) -> bool {
        is_bisect_version(version) && version.ends_with(&self.local_version())
    }
}

impl fmt::Display for BisectLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.local_version())
    }
}

/// Strict check that a kernel release string was produced by a bisection build.
#[must_use]
pub fn is_bisect_version(version: &str) -> bool {
    match BISECT_VERSION_RE.as_ref() {
        Ok(re) => re.is_match(version),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn label_uses_first_seven_hex_digits() {
        let label = BisectLabel::from_commit("AAA1111f00dbabe0123456789abcdef012345678").expect("label");
        assert_eq!(label.short_commit(), "aaa1111");
        assert_eq!(label.local_version(), "-bisect-aaa1111");
        assert_eq!(label.to_string(), "-bisect-aaa1111");
    }

    #[test]
    fn label_is_deterministic() {
        let a = BisectLabel::from_commit("bbb2222cafe").expect("label");
        let b = BisectLabel::from_commit("bbb2222beef").expect("label");
        assert_eq!(a, b);
    }

    #[rstest]
    #[case("abc")]
    #[case("v6.1-rc1")]
    #[case("zzzzzzzz")]
    fn label_rejects_non_hash_input(#[case] commit: &str) {
        assert!(matches!(
            BisectLabel::from_commit(commit),
            Err(SafetyError::Checkout { .. })
        ));
    }

    #[rstest]
    #[case("5.15.0-bisect-aaa1111", true)]
    #[case("6.8.0-rc3-bisect-0123456789", true)]
    #[case("5.14.0-host", false)]
    #[case("5.15.0-bisect-", false)]
    #[case("5.15.0-bisect-ABC1234", false)]
    #[case("5.15.0-bisect-abc12", false)]
    #[case("5.15.0-bisect-aaa1111.old", false)]
    #[case("mybisect-kernel", false)]
    fn strict_pattern(#[case] version: &str, #[case] expected: bool) {
        assert_eq!(is_bisect_version(version), expected, "{version}");
    }

    #[test]
    fn matches_only_its_own_suffix() {
        let label = BisectLabel::from_commit("ccc3333").expect("label");
        assert!(label.matches_version("5.15.0-bisect-ccc3333"));
        assert!(!label.matches_version("5.15.0-bisect-aaa1111"));
    }
}
