//! Opt-out list of implementation id patterns.
//!
//! Patterns are regular expressions matched against the whole implementation
//! id. The registry consults the list on every query, so edits made at runtime
//! apply to the very next lookup. Views that memoize query results compare
//! [`BlockList::version`] to notice edits. Configuration reads extra patterns
//! from [`BLOCKLIST_ENV`].

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use regex::Regex;

use super::{ImplementationId, PluginError, PluginResult};

/// Environment variable holding a comma-separated list of patterns.
pub const BLOCKLIST_ENV: &str = "PLUGBAY_BLOCKLIST";

/// Thread-safe list of blocked implementation patterns.
#[derive(Debug, Default)]
pub struct BlockList {
    patterns: RwLock<Vec<(String, Regex)>>,
    version: AtomicU64,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from the given patterns.
    pub fn from_patterns<I, S>(patterns: I) -> PluginResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = Self::new();
        for pattern in patterns {
            list.push(pattern.as_ref())?;
        }
        Ok(list)
    }

    /// Add a pattern.
    pub fn push(&self, pattern: &str) -> PluginResult<()> {
        let compiled = compile(pattern)?;
        self.patterns.write().push((pattern.to_string(), compiled));
        self.bump();
        Ok(())
    }

    /// Replace every pattern at once. On error the list is left untouched.
    pub fn set_patterns<I, S>(&self, patterns: I) -> PluginResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let compiled = patterns
            .into_iter()
            .map(|p| compile(p.as_ref()).map(|re| (p.as_ref().to_string(), re)))
            .collect::<PluginResult<Vec<_>>>()?;
        *self.patterns.write() = compiled;
        self.bump();
        Ok(())
    }

    pub fn clear(&self) {
        self.patterns.write().clear();
        self.bump();
    }

    /// Whether the implementation matches any pattern.
    pub fn is_blocked(&self, implementation: &ImplementationId) -> bool {
        self.patterns.read().iter().any(|(_, re)| re.is_match(implementation.as_str()))
    }

    /// The patterns as written.
    pub fn patterns(&self) -> Vec<String> {
        self.patterns.read().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.read().is_empty()
    }

    /// Counter bumped by every edit.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }
}

/// Split a comma-separated pattern list, dropping blanks.
pub fn split_patterns(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|p| !p.is_empty()).map(String::from).collect()
}

fn compile(pattern: &str) -> PluginResult<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| PluginError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
