//! Version grammar and precedence.
//!
//! Accepted form: `MAJOR.MINOR.PATCH` with an optional `-PRERELEASE` tag made
//! of ASCII alphanumerics and dots. Precedence only looks at the numeric
//! triple, so `1.2.0-beta` and `1.2.0` compare equal. Equality (`==`) is exact
//! string equality and is what catalog uniqueness uses.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

static VERSION_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+(-[A-Za-z0-9.]+)?$").expect("version grammar is a valid regex")
});

/// Errors produced when a string is not a valid version.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The string does not match `MAJOR.MINOR.PATCH[-PRERELEASE]`.
    #[error("'{0}' is not a valid version (expected MAJOR.MINOR.PATCH[-PRERELEASE], e.g. 1.2.3)")]
    Grammar(String),

    /// A numeric component does not fit in 64 bits.
    #[error("version component out of range in '{0}'")]
    Overflow(String),
}

/// A version string validated against the package grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    raw: String,
    core: [u64; 3],
}

impl Version {
    /// Parse and validate a version string.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::Grammar`] when the string does not match the
    /// grammar and [`VersionError::Overflow`] when a component exceeds `u64`.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        if !VERSION_GRAMMAR.is_match(s) {
            return Err(VersionError::Grammar(s.to_string()));
        }

        let numeric = s.split_once('-').map_or(s, |(n, _)| n);
        let mut core = [0u64; 3];
        for (slot, part) in core.iter_mut().zip(numeric.split('.')) {
            *slot = part
                .parse()
                .map_err(|_| VersionError::Overflow(s.to_string()))?;
        }

        Ok(Self {
            raw: s.to_string(),
            core,
        })
    }

    /// Returns `true` if `s` satisfies the version grammar.
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// Return the original version string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The numeric `(major, minor, patch)` triple.
    pub fn core(&self) -> (u64, u64, u64) {
        (self.core[0], self.core[1], self.core[2])
    }

    /// The pre-release tag, without the leading dash.
    pub fn pre_release(&self) -> Option<&str> {
        self.raw.split_once('-').map(|(_, tag)| tag)
    }

    /// Compare precedence with `other`, ignoring pre-release tags.
    pub fn precedence(&self, other: &Self) -> Ordering {
        self.core.cmp(&other.core)
    }

    /// Returns `true` if `self` has strictly higher precedence than `other`.
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.precedence(other) == Ordering::Greater
    }
}

/// Compare two versions by their numeric triple.
///
/// Antisymmetric and reflexive: `compare(a, b) == compare(b, a).reverse()` and
/// `compare(a, a) == Ordering::Equal`. Versions differing only in their
/// pre-release tag compare equal.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.precedence(b)
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl PartialEq<str> for Version {
    fn eq(&self, other: &str) -> bool {
        self.raw == other
    }
}

impl PartialEq<&str> for Version {
    fn eq(&self, other: &&str) -> bool {
        self.raw == *other
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn accepts_release_and_prerelease() {
        assert_eq!(v("1.2.3").core(), (1, 2, 3));
        assert_eq!(v("0.0.0").core(), (0, 0, 0));
        assert_eq!(v("10.20.30-beta.1").pre_release(), Some("beta.1"));
        assert_eq!(v("1.0.0-RC1").pre_release(), Some("RC1"));
        assert_eq!(v("1.0.0").pre_release(), None);
    }

    #[test]
    fn rejects_outside_grammar() {
        for bad in [
            "", "1", "1.2", "v1.2.3", "1.2.3.4", "1.2.3-", "1.2.3-beta_1", " 1.2.3",
            "1.2.3 ", "1.2.x", "1.2.3+build", "1.2.3-beta-2",
        ] {
            assert!(
                matches!(Version::parse(bad), Err(VersionError::Grammar(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_overflowing_component() {
        let huge = "1.99999999999999999999999.0";
        assert!(matches!(
            Version::parse(huge),
            Err(VersionError::Overflow(_))
        ));
    }

    #[test]
    fn compares_numerically_not_lexically() {
        assert_eq!(compare(&v("1.10.0"), &v("1.9.0")), Ordering::Greater);
        assert_eq!(compare(&v("2.0.0"), &v("1.99.99")), Ordering::Greater);
        assert_eq!(compare(&v("1.2.3"), &v("1.2.4")), Ordering::Less);
    }

    #[test]
    fn prerelease_tag_is_ignored_for_precedence() {
        assert_eq!(compare(&v("1.2.0-beta"), &v("1.2.0")), Ordering::Equal);
        assert_eq!(compare(&v("1.2.0-alpha"), &v("1.2.0-rc.1")), Ordering::Equal);
        // ...but not for equality
        assert_ne!(v("1.2.0-beta"), v("1.2.0"));
    }

    #[test]
    fn compare_is_antisymmetric_and_reflexive() {
        let all = [
            "0.0.1", "0.1.0", "1.0.0", "1.0.0-beta", "1.1.0", "1.10.0", "2.0.0-rc.2", "2.0.0",
            "10.0.0",
        ]
        .map(v);

        for a in &all {
            assert_eq!(compare(a, a), Ordering::Equal);
            for b in &all {
                assert_eq!(compare(a, b), compare(b, a).reverse(), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn serde_roundtrip_validates() {
        let parsed: Version = serde_json::from_str("\"1.4.2\"").unwrap();
        assert_eq!(parsed, "1.4.2");
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"1.4.2\"");
        assert!(serde_json::from_str::<Version>("\"1.4\"").is_err());
    }
}
