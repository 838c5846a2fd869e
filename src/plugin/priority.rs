//! Priority bands used to rank plugins of the same capability.
//!
//! Higher values are preferred. The numeric values of the named bands are a
//! public contract: consumers rely on their spacing for relative ordering, and
//! two priorities at least [`Priority::SEPARATOR_GAP`] apart are considered
//! distinct groups (menus draw a separator between them, for example).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::PluginError;

/// Numeric plugin priority.
///
/// Ordering is total (`f64::total_cmp`), so infinities sort as expected. NaN is
/// never stored: [`Priority::new`] maps it to [`Priority::NORMAL`], and parsing
/// or deserializing it is an error.
#[derive(Debug, Clone, Copy)]
pub struct Priority(f64);

impl Priority {
    /// Always first.
    pub const FIRST: Self = Self(f64::INFINITY);
    pub const EXTREMELY_HIGH: Self = Self(1_000_000.0);
    pub const VERY_HIGH: Self = Self(10_000.0);
    pub const HIGH: Self = Self(100.0);
    /// Default for descriptors that do not specify a priority.
    pub const NORMAL: Self = Self(0.0);
    pub const LOW: Self = Self(-100.0);
    pub const VERY_LOW: Self = Self(-10_000.0);
    pub const EXTREMELY_LOW: Self = Self(-1_000_000.0);
    /// Always last.
    pub const LAST: Self = Self(f64::NEG_INFINITY);

    /// Minimum distance between two priorities for them to form separate groups.
    pub const SEPARATOR_GAP: f64 = 10.0;

    /// Named bands in descending order.
    pub const BANDS: [(&'static str, Self); 9] = [
        ("first", Self::FIRST),
        ("extremely-high", Self::EXTREMELY_HIGH),
        ("very-high", Self::VERY_HIGH),
        ("high", Self::HIGH),
        ("normal", Self::NORMAL),
        ("low", Self::LOW),
        ("very-low", Self::VERY_LOW),
        ("extremely-low", Self::EXTREMELY_LOW),
        ("last", Self::LAST),
    ];

    /// Wrap a raw value. NaN has no place in the ordering and becomes
    /// [`Priority::NORMAL`].
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::NORMAL;
        }
        Self(value)
    }

    pub const fn value(self) -> f64 {
        self.0
    }

    /// Whether `a` and `b` are far enough apart to warrant a visual separator.
    pub fn warrants_separator(a: Self, b: Self) -> bool {
        if a.0 == b.0 {
            return false;
        }
        (a.0 - b.0).abs() >= Self::SEPARATOR_GAP
    }

    /// Name of the band this priority sits on exactly, if any.
    pub fn band_name(self) -> Option<&'static str> {
        Self::BANDS.iter().find(|(_, p)| *p == self).map(|(name, _)| *name)
    }

}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for Priority {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.band_name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for Priority {
    type Err = PluginError;

    /// Accepts a band name (`"high"`, `"very_low"`, case-insensitive) or a number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        if let Some((_, priority)) = Self::BANDS.iter().find(|(name, _)| *name == normalized) {
            return Ok(*priority);
        }
        normalized
            .parse::<f64>()
            .ok()
            .filter(|v| !v.is_nan())
            .map(Self::new)
            .ok_or_else(|| PluginError::Validation(format!("Invalid priority: '{s}'")))
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.band_name() {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_f64(self.0),
        }
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Float(f64),
            Int(i64),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Float(v) if v.is_nan() => {
                Err(serde::de::Error::custom("priority must be a number, not NaN"))
            }
            Raw::Float(v) => Ok(Self(v)),
            Raw::Int(v) => Ok(Self(v as f64)),
            Raw::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}
