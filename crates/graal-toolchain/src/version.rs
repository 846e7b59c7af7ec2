//! Toolchain version ordering
//!
//! GraalVM versions are dotted numbers with optional dash-separated
//! qualifiers (`19.2.0-dev-b01`). Ordering is segment-wise: numbers compare
//! numerically, and a qualifier following otherwise-equal numbers sorts after
//! the bare release. Callers only branch on the sign relative to a fixed
//! threshold, so this is not a full semver implementation.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// One `.`- or `-`-separated piece of a version identifier.
///
/// Variant order matters: every numeric segment sorts before any qualifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Segment {
    Numeric(u64),
    Qualifier(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse() {
                return Segment::Numeric(n);
            }
        }
        Segment::Qualifier(raw.to_string())
    }
}

/// A parsed toolchain version, ordered by [`compare_versions`] semantics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct VersionNumber {
    raw: String,
    segments: Vec<Segment>,
}

impl VersionNumber {
    /// Parse a version identifier. Never fails; unexpected shapes still
    /// produce a consistent ordering.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let segments = raw.split(['.', '-']).map(Segment::parse).collect();
        VersionNumber { raw, segments }
    }

    /// The identifier exactly as supplied
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl From<String> for VersionNumber {
    fn from(raw: String) -> Self {
        VersionNumber::new(raw)
    }
}

impl From<&str> for VersionNumber {
    fn from(raw: &str) -> Self {
        VersionNumber::new(raw)
    }
}

impl From<VersionNumber> for String {
    fn from(version: VersionNumber) -> Self {
        version.raw
    }
}

impl FromStr for VersionNumber {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(VersionNumber::new(s))
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl PartialEq for VersionNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionNumber {}

impl PartialOrd for VersionNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        // Missing trailing segments count as zero, so "20.3" == "20.3.0".
        // A qualifier still outranks the zero it is compared against.
        static ZERO: Segment = Segment::Numeric(0);
        let len = self.segments.len().max(other.segments.len());
        (0..len)
            .map(|i| {
                let a = self.segments.get(i).unwrap_or(&ZERO);
                let b = other.segments.get(i).unwrap_or(&ZERO);
                a.cmp(b)
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

/// Compare two version identifiers
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    VersionNumber::new(a).cmp(&VersionNumber::new(b))
}
