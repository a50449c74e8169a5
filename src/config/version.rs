//! Version gating for transformer packages using semver constraints.
//!
//! A package may declare `supported_versions` like ">=1.8.0, <1.9.0"; it is
//! matched against the source archive's version id.

use semver::{Version, VersionReq};
use std::fmt;

/// Errors during version filtering
#[derive(Debug, Clone)]
pub enum VersionError {
    /// Version id with no semver reading (e.g. a snapshot id like "15w14a")
    InvalidVersion { value: String, source: String },
    /// Invalid version requirement (e.g., ">=bad")
    InvalidRequirement { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid version '{}': {}", value, source)
            }
            VersionError::InvalidRequirement { value, source } => {
                write!(f, "invalid version requirement '{}': {}", value, source)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Parse a version id, padding short release ids ("1.8" → "1.8.0").
pub fn parse_version(value: &str) -> Result<Version, VersionError> {
    let value = value.trim();
    let (core, rest) = match value.find(['-', '+']) {
        Some(idx) => value.split_at(idx),
        None => (value, ""),
    };
    let padded = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, rest),
        2 => format!("{}.0{}", core, rest),
        _ => value.to_string(),
    };
    Version::parse(&padded).map_err(|e| VersionError::InvalidVersion {
        value: value.to_string(),
        source: e.to_string(),
    })
}

/// Check if a version matches a requirement string
///
/// # Examples
///
/// ```
/// use jar_patcher::config::version::matches_requirement;
///
/// assert!(matches_requirement("1.8.8", Some(">=1.8.0")).unwrap());
/// assert!(matches_requirement("1.8", Some(">=1.8.0, <1.9.0")).unwrap());
/// assert!(!matches_requirement("1.7.10", Some(">=1.8.0")).unwrap());
///
/// // None requirement means "any version"
/// assert!(matches_requirement("1.12.2", None).unwrap());
/// ```
pub fn matches_requirement(
    version: &str,
    requirement: Option<&str>,
) -> Result<bool, VersionError> {
    let Some(req_str) = requirement else {
        return Ok(true);
    };

    let req_str = req_str.trim();
    if req_str.is_empty() {
        return Ok(true);
    }

    let req = VersionReq::parse(req_str).map_err(|e| VersionError::InvalidRequirement {
        value: req_str.to_string(),
        source: e.to_string(),
    })?;
    let version = parse_version(version)?;

    Ok(req.matches(&version))
}
