//! Module identity: name and semantic version.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::{Error, Result};

static NAME_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[a-z0-9]([a-z0-9-]{1,62})?[a-z0-9]$").unwrap());

/// A module name: lowercase, 3-64 chars, alphanumeric with hyphens, never
/// starting or ending with a hyphen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleName(String);

impl ModuleName {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() < 3 || raw.len() > 64 {
            return Err(Error::InvalidInput(format!(
                "module name must be 3-64 chars: {raw:?}"
            )));
        }
        if !NAME_RE.is_match(raw) {
            return Err(Error::InvalidInput(format!(
                "module name must be lowercase alphanumeric-with-hyphens, not starting/ending with a hyphen: {raw:?}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ModuleName {
    type Error = Error;
    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ModuleName> for String {
    fn from(value: ModuleName) -> Self {
        value.0
    }
}

/// Semantic version: MAJOR.MINOR.PATCH with an optional pre-release suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: Option<String>,
}

impl Version {
    pub fn parse(raw: &str) -> Result<Self> {
        let (core, pre_release) = match raw.split_once('-') {
            Some((core, pre)) => (core, Some(pre.to_string())),
            None => (raw, None),
        };
        let mut parts = core.split('.');
        let (major, minor, patch) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(a), Some(b), Some(c), None) => (a, b, c),
            _ => {
                return Err(Error::InvalidInput(format!(
                    "version must be MAJOR.MINOR.PATCH: {raw:?}"
                )));
            }
        };
        let parse_num = |s: &str| {
            s.parse::<u64>()
                .map_err(|_| Error::InvalidInput(format!("invalid version component: {s:?}")))
        };
        Ok(Self {
            major: parse_num(major)?,
            minor: parse_num(minor)?,
            patch: parse_num(patch)?,
            pre_release,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Version {
    type Error = Error;
    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

/// A deployable artifact: the image/bundle reference plus the digest and
/// detached signature that the verifier must check before any node is
/// touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub reference: String,
    pub digest: String,
    pub signature: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_names() {
        assert!(ModuleName::parse("payments").is_ok());
        assert!(ModuleName::parse("payments-api").is_ok());
        assert!(ModuleName::parse("a23").is_ok());
    }

    #[test]
    fn rejects_bad_names() {
        assert!(ModuleName::parse("ab").is_err());
        assert!(ModuleName::parse("-payments").is_err());
        assert!(ModuleName::parse("payments-").is_err());
        assert!(ModuleName::parse("Payments").is_err());
        assert!(ModuleName::parse(&"x".repeat(65)).is_err());
    }

    #[test]
    fn parses_semver_with_prerelease() {
        let v = Version::parse("1.2.3-rc.1").unwrap();
        assert_eq!(v.major, 1);
        assert_eq!(v.minor, 2);
        assert_eq!(v.patch, 3);
        assert_eq!(v.pre_release.as_deref(), Some("rc.1"));
        assert_eq!(v.to_string(), "1.2.3-rc.1");
    }

    #[test]
    fn rejects_malformed_semver() {
        assert!(Version::parse("1.2").is_err());
        assert!(Version::parse("1.2.x").is_err());
    }
}
