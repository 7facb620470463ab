//! The engine version triple.
//!
//! Versions show up as singleton-registry arguments (the compatibility
//! version a wrapper was requested for), so they need total order, hashing,
//! and a stable string form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A `major.minor.micro` version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    major: u32,
    minor: u32,
    micro: u32,
}

impl Version {
    /// Build a version from its components.
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Version {
            major,
            minor,
            micro,
        }
    }

    /// Major component.
    pub fn major(&self) -> u32 {
        self.major
    }

    /// Minor component.
    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Micro component.
    pub fn micro(&self) -> u32 {
        self.micro
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Failure to parse a version string.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid version string {input:?}: expected major.minor.micro")]
pub struct ParseVersionError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let reject = || ParseVersionError {
            input: s.to_string(),
        };
        let mut parts = s.split('.');
        let major = parts.next().ok_or_else(reject)?;
        let minor = parts.next().ok_or_else(reject)?;
        let micro = parts.next().ok_or_else(reject)?;
        if parts.next().is_some() {
            return Err(reject());
        }
        Ok(Version {
            major: major.parse().map_err(|_| reject())?,
            minor: minor.parse().map_err(|_| reject())?,
            micro: micro.parse().map_err(|_| reject())?,
        })
    }
}

impl TryFrom<String> for Version {
    type Error = ParseVersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Version> for String {
    fn from(v: Version) -> String {
        v.to_string()
    }
}
