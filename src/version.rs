// src/version.rs

//! pacman-style package version ordering
//!
//! A version string such as `1.0.1-4` or `r38.ge82d1a6-1` is reduced to an
//! ordered sequence of non-negative integers: the release hyphen becomes a
//! segment delimiter, every character that is neither a digit nor a dot is
//! dropped, and the remaining dot-separated segments are read as integers.
//! Sequences compare lexicographically; when one is a prefix of the other
//! the shorter one is smaller.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// One numeric segment of a version
///
/// Stored as its decimal digits without leading zeros so that arbitrarily
/// long digit runs (e.g. from VCS hashes) still compare numerically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Segment(String);

impl Segment {
    fn new(digits: &str) -> Self {
        let trimmed = digits.trim_start_matches('0');
        Segment(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() })
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed package version
///
/// `Display` yields the original string; equality and ordering only look at
/// the derived segments.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    segments: Vec<Segment>,
}

impl Version {
    /// Parse a version string, failing when it contains no digits
    pub fn parse(version: &str) -> Result<Self> {
        let sanitized: String = version
            .chars()
            .map(|c| if c == '-' { '.' } else { c })
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        let segments: Vec<Segment> = sanitized
            .split('.')
            .filter(|part| !part.is_empty())
            .map(Segment::new)
            .collect();

        if segments.is_empty() {
            return Err(Error::InvalidVersion(version.to_string()));
        }

        Ok(Self {
            raw: version.to_string(),
            segments,
        })
    }

    /// The original version string
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Derived numeric segments, joined with dots
    pub fn canonical(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.0.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Vec's lexicographic order already treats a proper prefix as smaller
        self.segments.cmp(&other.segments)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}
