//! `happy_hare_version` stamps and upgrade detection.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::cfg::{Document, Value};
use crate::error::AppError;

pub const VERSION_OPTION: &str = "happy_hare_version";
pub const VERSION_SECTION: &str = "mmu";

/// A `major.minor` release. The minor part always has two digits, so `3.1`
/// and `3.10` are the same version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HhVersion {
    pub major: u32,
    pub minor: u32,
}

impl HhVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl FromStr for HhVersion {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let bad = || AppError::Config(format!("invalid version '{text}', expected e.g. 3.20"));
        let (major, minor) = text.split_once('.').unwrap_or((text, "0"));
        if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit()) {
            return Err(bad());
        }
        if minor.is_empty() || minor.len() > 2 || !minor.chars().all(|c| c.is_ascii_digit()) {
            return Err(bad());
        }
        let major: u32 = major.parse().map_err(|_| bad())?;
        let mut minor: u32 = minor.parse().map_err(|_| bad())?;
        if text.split_once('.').is_some_and(|(_, m)| m.len() == 1) {
            minor *= 10;
        }
        Ok(HhVersion { major, minor })
    }
}

impl fmt::Display for HhVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

impl Serialize for HhVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What a config file says about its own version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum VersionStamp {
    /// No `happy_hare_version` option at all.
    Missing,
    /// Still the template's `{placeholder}`.
    Unrendered(String),
    Version(HhVersion),
}

impl VersionStamp {
    pub fn from_value(raw: Option<&str>) -> Result<Self, AppError> {
        let Some(raw) = raw else {
            return Ok(VersionStamp::Missing);
        };
        match Value::infer(raw) {
            Value::Empty => Ok(VersionStamp::Missing),
            Value::Placeholder(name) => Ok(VersionStamp::Unrendered(name)),
            _ => raw.parse().map(VersionStamp::Version),
        }
    }

    /// Read the stamp from `[mmu] happy_hare_version`.
    pub fn read(doc: &Document) -> Result<Self, AppError> {
        Self::from_value(doc.get(VERSION_SECTION, VERSION_OPTION))
    }

    pub fn version(&self) -> Option<HhVersion> {
        match self {
            VersionStamp::Version(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionStamp::Missing => f.write_str("missing"),
            VersionStamp::Unrendered(name) => write!(f, "{{{name}}}"),
            VersionStamp::Version(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    FreshInstall,
    UpToDate,
    Upgrade,
    Downgrade,
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VersionStatus::FreshInstall => "fresh install",
            VersionStatus::UpToDate => "up to date",
            VersionStatus::Upgrade => "upgrade",
            VersionStatus::Downgrade => "downgrade",
        })
    }
}

/// Compare an existing stamp against the version being installed.
/// A missing or unrendered stamp means there is nothing to upgrade.
pub fn check(current: &VersionStamp, target: HhVersion) -> VersionStatus {
    match current.version() {
        None => VersionStatus::FreshInstall,
        Some(v) if v == target => VersionStatus::UpToDate,
        Some(v) if v < target => VersionStatus::Upgrade,
        Some(_) => VersionStatus::Downgrade,
    }
}
