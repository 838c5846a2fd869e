//! Plugin descriptors and the identifiers they are made of.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Priority;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(id: impl Into<Arc<str>>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.into())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id.into())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Identifier of an abstract capability that several plugins may implement.
    Capability
}

string_id! {
    /// Identifier of a concrete implementation, looked up in the implementation
    /// catalog when the plugin is constructed.
    ImplementationId
}

/// Immutable metadata describing one concrete plugin without constructing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Capability this plugin provides.
    pub capability: Capability,
    /// Implementation used to build it.
    pub implementation: ImplementationId,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Ranking among plugins of the same capability.
    #[serde(default)]
    pub priority: Priority,
}

impl PluginDescriptor {
    /// Create a descriptor with an empty name and normal priority.
    pub fn new(capability: impl Into<Capability>, implementation: impl Into<ImplementationId>) -> Self {
        Self {
            capability: capability.into(),
            implementation: implementation.into(),
            name: String::new(),
            priority: Priority::NORMAL,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// The name if set, otherwise the implementation id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.implementation.as_str()
        } else {
            &self.name
        }
    }
}

impl fmt::Display for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] ({})", self.display_name(), self.capability, self.priority)
    }
}
