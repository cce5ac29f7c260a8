//! Kubernetes version parsing, ordering, and upgrade-path planning under
//! Kubernetes version-skew rules (no skipping minor versions).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A Kubernetes version `(major, minor, patch)`, lexicographically ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Fails when `major != 1`, `minor < 20`, or `minor > 31`.
    pub fn validate(&self) -> Result<(), String> {
        if self.major != 1 {
            return Err(format!(
                "only Kubernetes 1.x versions are supported (got {}.x)",
                self.major
            ));
        }
        if self.minor < 20 {
            return Err(format!(
                "Kubernetes {self} is too old (minimum supported: 1.20)"
            ));
        }
        if self.minor > 31 {
            return Err(format!(
                "Kubernetes {self} is not yet released or supported"
            ));
        }
        Ok(())
    }

    /// True when `self` and `other` share the same minor version (a patch-only upgrade).
    pub const fn is_patch_upgrade(&self, target: &Self) -> bool {
        self.major == target.major && self.minor == target.minor
    }

    /// The upgrade path from `self` to `target`, excluding `self`, including `target`.
    ///
    /// Empty when `self >= target`. A single-element path when the minors are
    /// equal (patch upgrade) or adjacent (single minor step). Otherwise one
    /// `(major, k, 0)` placeholder per skipped intermediate minor, followed by
    /// `target` itself — Kubernetes forbids skipping minor versions, and the
    /// `.0` patch is a documentation placeholder the agent resolves concretely.
    pub fn path(&self, target: &Self) -> Vec<Self> {
        if self >= target {
            return Vec::new();
        }
        if self.minor == target.minor {
            return vec![*target];
        }
        if target.minor == self.minor + 1 {
            return vec![*target];
        }
        let mut path = Vec::new();
        for minor in (self.minor + 1)..target.minor {
            path.push(Self::new(self.major, minor, 0));
        }
        path.push(*target);
        path
    }

    /// Human-readable advisories about the jump from `self` to `target`.
    pub fn warnings(&self, target: &Self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self >= target {
            warnings.push(format!(
                "target version {target} is not newer than current {self}"
            ));
            return warnings;
        }

        if target.major != self.major {
            warnings.push(format!(
                "major version change detected: {} -> {}",
                self.major, target.major
            ));
        }

        let minor_diff = target.minor - self.minor;
        if minor_diff > 3 {
            warnings.push(format!(
                "large version jump: {minor_diff} minor versions. this will require {minor_diff} sequential upgrades."
            ));
        }

        if self.minor <= 21 && target.minor >= 22 {
            warnings.push(
                "upgrading from 1.21 or earlier to 1.22+: several beta APIs have been removed. ensure all manifests use stable API versions.".to_string(),
            );
        }
        if self.minor <= 24 && target.minor >= 25 {
            warnings.push(
                "upgrading to 1.25+: PodSecurityPolicy has been removed. migrate to Pod Security Standards before upgrading.".to_string(),
            );
        }
        if self.minor <= 25 && target.minor >= 26 {
            warnings.push(
                "upgrading to 1.26+: several beta APIs have been removed. review the release notes for breaking changes.".to_string(),
            );
        }

        warnings
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Error parsing a version string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid version format: {0}")]
pub struct ParseVersionError(pub String);

impl FromStr for Version {
    type Err = ParseVersionError;

    /// Accepts `[v]M.m[.p]`; missing patch defaults to 0. Rejects inputs with
    /// fewer than two dotted components or non-integer parts.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix('v').unwrap_or(s);
        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() < 2 {
            return Err(ParseVersionError(s.to_string()));
        }
        let parse = |p: &str| p.parse::<u32>().map_err(|_| ParseVersionError(s.to_string()));
        let major = parse(parts[0])?;
        let minor = parse(parts[1])?;
        let patch = if parts.len() > 2 { parse(parts[2])? } else { 0 };
        Ok(Self::new(major, minor, patch))
    }
}

/// Compare two versions; exposed for callers that prefer a free function over
/// `Ord` (mirrors the original's `__lt__`/`__ge__` overloads).
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!("1.27.4".parse(), Ok(Version::new(1, 27, 4)));
        assert_eq!("v1.27.4".parse(), Ok(Version::new(1, 27, 4)));
        assert_eq!("1.27".parse(), Ok(Version::new(1, 27, 0)));
    }

    #[test]
    fn test_parse_rejects_single_component() {
        assert!("1".parse::<Version>().is_err());
        assert!("abc".parse::<Version>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let v = Version::new(1, 27, 4);
        assert_eq!(v.to_string().parse::<Version>().unwrap(), v);
    }

    #[test]
    fn test_ordering() {
        assert!(Version::new(1, 27, 4) < Version::new(1, 27, 9));
        assert!(Version::new(1, 27, 9) < Version::new(1, 28, 0));
        assert!(Version::new(1, 27, 0) == Version::new(1, 27, 0));
    }

    #[test]
    fn test_validate_bounds() {
        assert!(Version::new(1, 27, 0).validate().is_ok());
        assert!(Version::new(2, 0, 0).validate().is_err());
        assert!(Version::new(1, 19, 0).validate().is_err());
        assert!(Version::new(1, 32, 0).validate().is_err());
    }

    #[test]
    fn test_path_patch_upgrade() {
        let current = Version::new(1, 27, 4);
        let target = Version::new(1, 27, 9);
        assert_eq!(current.path(&target), vec![target]);
    }

    #[test]
    fn test_path_single_minor_step() {
        let current = Version::new(1, 27, 4);
        let target = Version::new(1, 28, 0);
        assert_eq!(current.path(&target), vec![target]);
    }

    #[test]
    fn test_path_multi_step() {
        let current = Version::new(1, 25, 3);
        let target = Version::new(1, 28, 0);
        assert_eq!(
            current.path(&target),
            vec![
                Version::new(1, 26, 0),
                Version::new(1, 27, 0),
                Version::new(1, 28, 0),
            ]
        );
    }

    #[test]
    fn test_path_downgrade_is_empty() {
        let current = Version::new(1, 28, 0);
        let target = Version::new(1, 27, 4);
        assert_eq!(current.path(&target), Vec::new());
    }

    #[test]
    fn test_path_equal_is_empty() {
        let v = Version::new(1, 28, 0);
        assert_eq!(v.path(&v), Vec::new());
    }

    #[test]
    fn test_path_length_law() {
        let current = Version::new(1, 25, 3);
        let target = Version::new(1, 28, 0);
        assert_eq!(current.path(&target).len() as u32, target.minor - current.minor);

        let same_minor = Version::new(1, 27, 9);
        assert_eq!(current.path(&same_minor).len(), 0);
        let patch_only = Version::new(1, 25, 9);
        assert_eq!(Version::new(1, 25, 3).path(&patch_only).len(), 1);
    }

    #[test]
    fn test_warnings_major_change() {
        let warnings = Version::new(1, 27, 0).warnings(&Version::new(2, 0, 0));
        assert!(warnings.iter().any(|w| w.contains("major version change")));
    }

    #[test]
    fn test_warnings_large_jump() {
        let warnings = Version::new(1, 20, 0).warnings(&Version::new(1, 28, 0));
        assert!(warnings.iter().any(|w| w.contains("large version jump")));
    }

    #[test]
    fn test_warnings_api_removal_boundaries() {
        let w1 = Version::new(1, 21, 0).warnings(&Version::new(1, 22, 0));
        assert!(w1.iter().any(|w| w.contains("1.22+")));

        let w2 = Version::new(1, 24, 0).warnings(&Version::new(1, 25, 0));
        assert!(w2.iter().any(|w| w.contains("PodSecurityPolicy")));

        let w3 = Version::new(1, 25, 0).warnings(&Version::new(1, 26, 0));
        assert!(w3.iter().any(|w| w.contains("1.26+")));
    }

    #[test]
    fn test_is_patch_upgrade() {
        assert!(Version::new(1, 27, 4).is_patch_upgrade(&Version::new(1, 27, 9)));
        assert!(!Version::new(1, 27, 4).is_patch_upgrade(&Version::new(1, 28, 0)));
    }
}
