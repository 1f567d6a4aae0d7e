//! Version gating for patch sets using semver constraints.
//!
//! A patch set may declare a `version_range` like ">=0.4, <0.6"; it is
//! checked against the `version` field of the workspace's package.json,
//! so patches written for one release of the target app are skipped
//! rather than misapplied on another.

use semver::{Version, VersionReq};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone)]
pub enum VersionError {
    /// Invalid version string (e.g. "not-a-version")
    InvalidVersion { value: String, source: String },
    /// Invalid version requirement (e.g. ">=bad")
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

/// Check if a project version satisfies a requirement string.
///
/// `None` or an empty requirement means "apply to all versions".
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

    let version = Version::parse(version).map_err(|e| VersionError::InvalidVersion {
        value: version.to_string(),
        source: e.to_string(),
    })?;

    let req = VersionReq::parse(req_str).map_err(|e| VersionError::InvalidRequirement {
        value: req_str.to_string(),
        source: e.to_string(),
    })?;

    Ok(req.matches(&version))
}

/// Read the `version` field from `<workspace>/package.json`.
///
/// Returns `None` when the manifest is missing, unparseable, or has no
/// version field; callers decide whether to warn and fall back.
pub fn read_project_version(workspace_root: &Path) -> Option<String> {
    let manifest = std::fs::read_to_string(workspace_root.join("package.json")).ok()?;
    let json: serde_json::Value = serde_json::from_str(&manifest).ok()?;
    json.get("version")?.as_str().map(str::to_string)
}
