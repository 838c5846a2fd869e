//! Resolution error types.

use std::fmt;

use thiserror::Error;

use crate::plugin::{Capability, ImplementationId};

/// Result type for resolution operations.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Capabilities being resolved, outermost request first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionChain(Vec<Capability>);

impl ResolutionChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, capability: &Capability) -> bool {
        self.0.contains(capability)
    }

    pub(crate) fn push(&mut self, capability: Capability) {
        self.0.push(capability);
    }

    pub(crate) fn pop(&mut self) {
        self.0.pop();
    }

    /// This chain extended by `capability`, without modifying it.
    pub fn with(&self, capability: &Capability) -> Self {
        let mut chain = self.clone();
        chain.push(capability.clone());
        chain
    }

    /// The top-level request.
    pub fn root(&self) -> Option<&Capability> {
        self.0.first()
    }

    pub fn as_slice(&self) -> &[Capability] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ResolutionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, capability) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{capability}")?;
        }
        Ok(())
    }
}

/// Errors raised while resolving a capability.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No compatible descriptor and no default implementation.
    #[error("No compatible plugin for '{capability}' (requested via {chain})")]
    UnresolvableRequired { capability: Capability, chain: ResolutionChain },

    /// A descriptor was selected but building it failed.
    #[error("Invalid plugin '{implementation}' for '{capability}': {reason} (requested via {chain})")]
    ConstructionFailure {
        capability: Capability,
        implementation: ImplementationId,
        reason: String,
        chain: ResolutionChain,
    },

    /// Mutual dependency between capabilities.
    #[error("Dependency cycle detected: {chain}")]
    CycleDetected { chain: ResolutionChain },

    /// The instance exists but is not of the requested Rust type.
    #[error("Plugin '{implementation}' for '{capability}' is a {actual}, not a {expected}")]
    TypeMismatch {
        capability: Capability,
        implementation: ImplementationId,
        expected: &'static str,
        actual: &'static str,
    },

    /// The container has been disposed.
    #[error("Container has been disposed")]
    Disposed,
}

impl ResolveError {
    /// Chain of requests that led to the failure, when there is one.
    pub fn chain(&self) -> Option<&ResolutionChain> {
        match self {
            Self::UnresolvableRequired { chain, .. }
            | Self::ConstructionFailure { chain, .. }
            | Self::CycleDetected { chain } => Some(chain),
            Self::TypeMismatch { .. } | Self::Disposed => None,
        }
    }

    /// Errors that no failure policy may downgrade.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CycleDetected { .. } | Self::Disposed)
    }
}
