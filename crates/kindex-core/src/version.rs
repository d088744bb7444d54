//! # API Versions
//!
//! The configuration API is versioned with dotted release numbers
//! (`18.2.1`, `22.1`). Fields and kinds are introduced in, and sometimes
//! removed in, specific releases, so versions must order numerically rather
//! than lexically: `18.2.10` is newer than `18.2.9`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VersionParseError;

/// A dotted `major.minor.patch` API version. Missing trailing components
/// are zero, so `22.1` and `22.1.0` are the same version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

impl ApiVersion {
    /// Build a version from its three components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Major release number.
    pub fn major(&self) -> u32 {
        self.major
    }

    /// Minor release number.
    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Patch release number.
    pub fn patch(&self) -> u32 {
        self.patch
    }
}

impl FromStr for ApiVersion {
    type Err = VersionParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let mut parts = [0u32; 3];
        for (i, component) in trimmed.split('.').enumerate() {
            if i >= parts.len() {
                return Err(VersionParseError::TooManyComponents {
                    raw: raw.to_string(),
                });
            }
            parts[i] = component
                .parse()
                .map_err(|_| VersionParseError::InvalidComponent {
                    raw: raw.to_string(),
                    component: component.to_string(),
                })?;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApiVersion> for String {
    fn from(v: ApiVersion) -> Self {
        v.to_string()
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
