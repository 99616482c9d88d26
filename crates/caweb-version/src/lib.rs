//! Semantic version triples for the caweb configuration and schema formats.
//!
//! Both the on-disk configuration file and the database schema carry a
//! version of the form `major.minor.patch`. The major selects the format
//! adapter, the minor gates backward compatibility, and the patch is
//! informational.
//!
//! On the wire (YAML and JSON alike) a version is a three-element sequence:
//! `[2, 1, 0]` means `2.1.0`.

use std::fmt;
use std::str::FromStr;

/// A `major.minor.patch` semantic version.
///
/// Ordering is lexicographic on `(major, minor, patch)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(from = "(u32, u32, u32)", into = "(u32, u32, u32)")]
pub struct SemVer {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemVer {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether `self` can serve consumers that were written against `other`.
    ///
    /// This holds iff the majors match and `self.minor >= other.minor`. The
    /// patch component never affects compatibility.
    pub fn is_backward_compatible_with(&self, other: &SemVer) -> bool {
        self.major == other.major && self.minor >= other.minor
    }

    /// Like [`is_backward_compatible_with`] but produces the error value
    /// used throughout the migration engine.
    ///
    /// [`is_backward_compatible_with`]: SemVer::is_backward_compatible_with
    pub fn ensure_backward_compatible_with(
        &self,
        other: &SemVer,
    ) -> Result<(), MismatchingSemVerError> {
        if self.is_backward_compatible_with(other) {
            Ok(())
        } else {
            Err(MismatchingSemVerError {
                found: *self,
                required: *other,
            })
        }
    }
}

impl From<(u32, u32, u32)> for SemVer {
    fn from((major, minor, patch): (u32, u32, u32)) -> Self {
        Self::new(major, minor, patch)
    }
}

impl From<SemVer> for (u32, u32, u32) {
    fn from(v: SemVer) -> Self {
        (v.major, v.minor, v.patch)
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = ParseSemVerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let mut next = || {
            parts
                .next()
                .ok_or(ParseSemVerError { text: s.into() })?
                .parse::<u32>()
                .map_err(|_| ParseSemVerError { text: s.into() })
        };

        let major = next()?;
        let minor = next()?;
        let patch = next()?;

        Ok(Self::new(major, minor, patch))
    }
}

/// Two versions failed the backward-compatibility check.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("version {found} is not backward compatible with required version {required}")]
pub struct MismatchingSemVerError {
    pub found: SemVer,
    pub required: SemVer,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("`{text}` is not a valid semantic version")]
pub struct ParseSemVerError {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        assert!(SemVer::new(1, 9, 9) < SemVer::new(2, 0, 0));
        assert!(SemVer::new(2, 0, 1) < SemVer::new(2, 1, 0));
        assert!(SemVer::new(2, 1, 0) < SemVer::new(2, 1, 5));
        assert_eq!(SemVer::new(1, 2, 3), SemVer::new(1, 2, 3));
    }

    #[test]
    fn compatibility_requires_equal_major_and_ge_minor() {
        let v210 = SemVer::new(2, 1, 0);
        assert!(v210.is_backward_compatible_with(&SemVer::new(2, 0, 9)));
        assert!(v210.is_backward_compatible_with(&SemVer::new(2, 1, 7)));
        assert!(!v210.is_backward_compatible_with(&SemVer::new(2, 2, 0)));
        assert!(!v210.is_backward_compatible_with(&SemVer::new(1, 0, 0)));
        assert!(!v210.is_backward_compatible_with(&SemVer::new(3, 0, 0)));
    }

    #[test]
    fn ensure_reports_both_versions() {
        let err = SemVer::new(1, 0, 0)
            .ensure_backward_compatible_with(&SemVer::new(2, 0, 0))
            .unwrap_err();
        assert_eq!(err.found, SemVer::new(1, 0, 0));
        assert_eq!(err.required, SemVer::new(2, 0, 0));
    }

    #[test]
    fn serde_form_is_a_triple() {
        let v: SemVer = serde_json::from_str("[2, 1, 3]").unwrap();
        assert_eq!(v, SemVer::new(2, 1, 3));
        assert_eq!(serde_json::to_string(&v).unwrap(), "[2,1,3]");
    }

    #[test]
    fn parses_dotted_form() {
        assert_eq!("2.1.0".parse::<SemVer>().unwrap(), SemVer::new(2, 1, 0));
        assert!("2.1".parse::<SemVer>().is_err());
        assert!("a.b.c".parse::<SemVer>().is_err());
    }
}
