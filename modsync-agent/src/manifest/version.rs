//! Maven-style version range parsing and checking.
//!
//! Supported forms:
//!
//! - Intervals: `[1.0,2.0)`, `(1.0,2.0]`, `[1.0,)`, `(,2.0]`
//! - Exact pins: `[1.2.3]` or a bare `1.2.3`
//! - Lower bound shorthand: `1.0+`
//! - Unions of intervals: `[1.0,2.0),[3.0,4.0)`
//! - Anything: `*` or an empty string
//!
//! Versions are normalized to semver before comparing (`1` and `1.0` both
//! become `1.0.0`).
//!
//! # Examples
//!
//! ```
//! use modsync_agent::manifest::version::VersionRange;
//!
//! let range = VersionRange::parse("[1.0,2.0)").unwrap();
//! assert!(range.satisfies("1.5.3"));
//! assert!(!range.satisfies("2.0"));
//! ```

use crate::utils::errors::{Result, SyncError};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: semver::Version,
    inclusive: bool,
}

/// One interval of a range. `None` means unbounded on that side.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Restriction {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl Restriction {
    const EVERYTHING: Restriction = Restriction {
        lower: None,
        upper: None,
    };

    fn contains(&self, candidate: &semver::Version) -> bool {
        let above_lower = match &self.lower {
            None => true,
            Some(b) if b.inclusive => candidate >= &b.version,
            Some(b) => candidate > &b.version,
        };
        let below_upper = match &self.upper {
            None => true,
            Some(b) if b.inclusive => candidate <= &b.version,
            Some(b) => candidate < &b.version,
        };
        above_lower && below_upper
    }
}

/// A parsed version range; a version matches if any interval contains it.
#[derive(Debug, Clone)]
pub struct VersionRange {
    restrictions: Vec<Restriction>,
    raw: String,
}

impl VersionRange {
    pub fn parse(expr: &str) -> Result<Self> {
        let raw = expr.to_string();
        let expr = expr.trim();

        let restrictions = if expr.is_empty() || expr == "*" {
            vec![Restriction::EVERYTHING]
        } else if expr.starts_with('[') || expr.starts_with('(') {
            parse_intervals(expr)?
        } else if let Some(lower) = expr.strip_suffix('+') {
            vec![Restriction {
                lower: Some(Bound {
                    version: parse_bound_version(expr, lower)?,
                    inclusive: true,
                }),
                upper: None,
            }]
        } else {
            let version = parse_bound_version(expr, expr)?;
            vec![exact(version)]
        };

        Ok(Self { restrictions, raw })
    }

    /// Check a version string. Unparsable versions never match.
    pub fn satisfies(&self, version: &str) -> bool {
        match normalize_version(version) {
            Ok(v) => self.contains(&v),
            Err(_) => false,
        }
    }

    pub fn contains(&self, version: &semver::Version) -> bool {
        self.restrictions.iter().any(|r| r.contains(version))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn exact(version: semver::Version) -> Restriction {
    Restriction {
        lower: Some(Bound {
            version: version.clone(),
            inclusive: true,
        }),
        upper: Some(Bound {
            version,
            inclusive: true,
        }),
    }
}

fn parse_intervals(expr: &str) -> Result<Vec<Restriction>> {
    let mut restrictions = Vec::new();
    let mut rest = expr;

    while !rest.is_empty() {
        let open = rest.chars().next().unwrap_or_default();
        if open != '[' && open != '(' {
            return Err(range_error(expr, "expected '[' or '('"));
        }

        let close_at = rest
            .find([']', ')'])
            .ok_or_else(|| range_error(expr, "unterminated interval"))?;
        let close = rest[close_at..].chars().next().unwrap_or_default();
        let inner = rest[1..close_at].trim();

        restrictions.push(parse_interval(expr, open, inner, close)?);

        rest = rest[close_at + 1..].trim_start();
        if let Some(stripped) = rest.strip_prefix(',') {
            rest = stripped.trim_start();
            if rest.is_empty() {
                return Err(range_error(expr, "trailing ','"));
            }
        } else if !rest.is_empty() {
            return Err(range_error(expr, "intervals must be separated by ','"));
        }
    }

    Ok(restrictions)
}

fn parse_interval(expr: &str, open: char, inner: &str, close: char) -> Result<Restriction> {
    let Some((lower, upper)) = inner.split_once(',') else {
        if open != '[' || close != ']' {
            return Err(range_error(expr, "single version must use '[v]'"));
        }
        return Ok(exact(parse_bound_version(expr, inner)?));
    };

    let lower = lower.trim();
    let upper = upper.trim();

    let lower = if lower.is_empty() {
        None
    } else {
        Some(Bound {
            version: parse_bound_version(expr, lower)?,
            inclusive: open == '[',
        })
    };
    let upper = if upper.is_empty() {
        None
    } else {
        Some(Bound {
            version: parse_bound_version(expr, upper)?,
            inclusive: close == ']',
        })
    };

    if let (Some(l), Some(u)) = (&lower, &upper) {
        if l.version > u.version || (l.version == u.version && !(l.inclusive && u.inclusive)) {
            return Err(range_error(expr, "lower bound is above upper bound"));
        }
    }

    Ok(Restriction { lower, upper })
}

fn parse_bound_version(expr: &str, version: &str) -> Result<semver::Version> {
    normalize_version(version).map_err(|reason| range_error(expr, &reason))
}

fn range_error(expr: &str, reason: &str) -> SyncError {
    SyncError::Schema(format!("invalid version range '{}': {}", expr, reason))
}

/// Normalize a version string to semver by padding missing minor/patch.
///
/// - `"2"` -> `"2.0.0"`
/// - `"1.20"` -> `"1.20.0"`
/// - `"1.0-beta"` -> `"1.0.0-beta"`
/// - `"1.2.3.4"` -> `"1.2.3+4"`
///
/// Components past the third become build metadata. They still order
/// `1.2.3 < 1.2.3.4 < 1.2.4`, but a pre-release tag on a four-part version
/// sorts it below the three-part release.
pub fn normalize_version(s: &str) -> std::result::Result<semver::Version, String> {
    let s = s.trim();

    if let Ok(v) = semver::Version::parse(s) {
        return Ok(v);
    }

    let split_at = s.find(['-', '+']).unwrap_or(s.len());
    let (core, suffix) = s.split_at(split_at);
    if core.is_empty() {
        return Err(format!("invalid version '{}'", s));
    }

    let mut parts: Vec<&str> = core.split('.').collect();
    let extra = if parts.len() > 3 {
        parts.split_off(3).join(".")
    } else {
        String::new()
    };
    while parts.len() < 3 {
        parts.push("0");
    }

    let (pre, build) = match suffix.split_once('+') {
        Some((pre, build)) => (pre, build),
        None => (suffix, ""),
    };
    let build = match (extra.is_empty(), build.is_empty()) {
        (true, _) => build.to_string(),
        (false, true) => extra,
        (false, false) => format!("{}.{}", extra, build),
    };

    let mut normalized = parts.join(".");
    normalized.push_str(pre);
    if !build.is_empty() {
        normalized.push('+');
        normalized.push_str(&build);
    }

    semver::Version::parse(&normalized).map_err(|e| format!("invalid version '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_open_interval() {
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        assert!(range.satisfies("1.0"));
        assert!(range.satisfies("1.99.99"));
        assert!(!range.satisfies("2.0.0"));
        assert!(!range.satisfies("0.9"));
    }

    #[test]
    fn test_exclusive_lower_inclusive_upper() {
        let range = VersionRange::parse("(1.0,2.0]").unwrap();
        assert!(!range.satisfies("1.0.0"));
        assert!(range.satisfies("1.0.1"));
        assert!(range.satisfies("2.0.0"));
    }

    #[test]
    fn test_open_ended_intervals() {
        let at_least = VersionRange::parse("[1.5,)").unwrap();
        assert!(at_least.satisfies("1.5"));
        assert!(at_least.satisfies("100.0"));
        assert!(!at_least.satisfies("1.4.9"));

        let below = VersionRange::parse("(,1.5)").unwrap();
        assert!(below.satisfies("0.1"));
        assert!(!below.satisfies("1.5"));
    }

    #[test]
    fn test_exact_pin() {
        let bracketed = VersionRange::parse("[1.2.3]").unwrap();
        assert!(bracketed.satisfies("1.2.3"));
        assert!(!bracketed.satisfies("1.2.4"));

        let bare = VersionRange::parse("1.2").unwrap();
        assert!(bare.satisfies("1.2.0"));
        assert!(!bare.satisfies("1.3.0"));
    }

    #[test]
    fn test_plus_shorthand() {
        let range = VersionRange::parse("1.0+").unwrap();
        assert!(range.satisfies("1.0.0"));
        assert!(range.satisfies("3.1.4"));
        assert!(!range.satisfies("0.9.9"));
    }

    #[test]
    fn test_union() {
        let range = VersionRange::parse("[1.0,2.0), [3.0,4.0)").unwrap();
        assert!(range.satisfies("1.5"));
        assert!(!range.satisfies("2.5"));
        assert!(range.satisfies("3.0"));
        assert!(!range.satisfies("4.0"));
    }

    #[test]
    fn test_wildcard_and_empty() {
        assert!(VersionRange::parse("*").unwrap().satisfies("0.0.1"));
        assert!(VersionRange::parse("").unwrap().satisfies("99.0"));
    }

    #[test]
    fn test_prerelease_sorts_before_release() {
        let range = VersionRange::parse("[1.0,)").unwrap();
        assert!(!range.satisfies("1.0-beta"));
        assert!(range.satisfies("1.0.1-beta"));
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        assert!(VersionRange::parse("[1.0,2.0").is_err());
        assert!(VersionRange::parse("[2.0,1.0]").is_err());
        assert!(VersionRange::parse("(1.0)").is_err());
        assert!(VersionRange::parse("[1.0,2.0),").is_err());
        assert!(VersionRange::parse("[1.0,2.0)[3.0,)").is_err());
        assert!(VersionRange::parse("[abc,)").is_err());
    }

    #[test]
    fn test_unparsable_candidate_never_matches() {
        let range = VersionRange::parse("*").unwrap();
        assert!(!range.satisfies("not-a-version"));
    }

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("2").unwrap(), semver::Version::new(2, 0, 0));
        assert_eq!(normalize_version(" 1.20 ").unwrap(), semver::Version::new(1, 20, 0));
        assert_eq!(
            normalize_version("1.0-beta").unwrap(),
            semver::Version::parse("1.0.0-beta").unwrap()
        );
        assert!(normalize_version("").is_err());
        assert!(normalize_version("1.x").is_err());
    }

    #[test]
    fn test_four_part_versions() {
        let v = normalize_version("1.2.3.4").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));
        assert_eq!(v.build.as_str(), "4");

        assert_eq!(normalize_version("1.2.3.4-rc1").unwrap().to_string(), "1.2.3-rc1+4");
        assert_eq!(normalize_version("1.2.3.4+git").unwrap().build.as_str(), "4.git");

        assert!(VersionRange::parse("[1.0,2.0)").unwrap().satisfies("1.2.3.4"));
        assert!(VersionRange::parse("(1.2.3,1.2.4)").unwrap().satisfies("1.2.3.4"));
        assert!(!VersionRange::parse("[1.2.4,)").unwrap().satisfies("1.2.3.4"));
    }

    #[test]
    fn test_display_keeps_raw() {
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        assert_eq!(range.to_string(), "[1.0,2.0)");
    }
}
