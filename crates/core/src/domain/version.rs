use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::CoreError;

/// Dotted numeric version such as `2.0` or `3.1.4`.
///
/// Missing trailing parts compare as zero, so `1.0` and `1.0.0` are equal.
#[derive(Debug, Clone)]
pub struct Version {
    parts: Vec<u64>,
}

impl Version {
    pub fn zero() -> Self {
        Self { parts: vec![0] }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidVersion(s.to_string()));
        }

        let parts = trimmed
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(CoreError::InvalidVersion(s.to_string()));
                }
                part.parse::<u64>()
                    .map_err(|_| CoreError::InvalidVersion(s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { parts })
    }

    /// Parts with trailing zeros removed; equal versions share this form.
    fn significant(&self) -> &[u64] {
        let end = self
            .parts
            .iter()
            .rposition(|part| *part != 0)
            .map_or(0, |idx| idx + 1);
        &self.parts[..end]
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::zero()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for idx in 0..len {
            let left = self.parts.get(idx).copied().unwrap_or(0);
            let right = other.parts.get(idx).copied().unwrap_or(0);
            match left.cmp(&right) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
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

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.parts.iter().map(u64::to_string).collect();
        f.write_str(&rendered.join("."))
    }
}

impl FromStr for Version {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Inclusive range of module versions a component applies to.
///
/// An absent upper bound means the component applies to every later version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionRange {
    pub min: Version,
    pub max: Option<Version>,
}

impl VersionRange {
    pub fn new(min: Version, max: Option<Version>) -> Result<Self, CoreError> {
        if let Some(max) = &max {
            if &min > max {
                return Err(CoreError::InvalidVersionRange {
                    min: min.to_string(),
                    max: max.to_string(),
                });
            }
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, version: &Version) -> bool {
        if version < &self.min {
            return false;
        }
        match &self.max {
            Some(max) => version <= max,
            None => true,
        }
    }

    /// Parse an upper bound where `*` (or an empty string) means unbounded.
    pub fn parse_bound(s: &str) -> Result<Option<Version>, CoreError> {
        match s.trim() {
            "" | "*" => Ok(None),
            bound => Version::parse(bound).map(Some),
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.max {
            Some(max) => write!(f, "[{}, {}]", self.min, max),
            None => write!(f, "[{}, *]", self.min),
        }
    }
}
