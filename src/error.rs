//! Error types for the reconciliation engine
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the resource kind and identity key where one is
//! known, so an operator can see exactly which step of a run failed and
//! retry after fixing the root cause.
//!
//! The engine branches on error *kind*, never on message content:
//! duplicate-rule detection, not-found-means-absent, and transient
//! retry decisions all work off the variant.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for reconciliation operations
#[derive(Debug, Error)]
pub enum Error {
    /// Transient provider failure (rate limit, temporary unavailability)
    ///
    /// Safe to retry with backoff. Only listing/describe calls are ever
    /// retried; create calls are recovered by the next idempotent run.
    #[error("transient provider error during {operation}: {message}")]
    Transient {
        /// The operation that failed (e.g. "list_gateways")
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// The external system rejected a mutation as already present
    ///
    /// For ingress-rule creation this is success, not failure.
    #[error("duplicate {kind}: {identity} already present")]
    Duplicate {
        /// Resource kind the duplicate was reported for
        kind: String,
        /// Identity key of the duplicate
        identity: String,
    },

    /// A describe/listing call found no matching resource
    ///
    /// The locator treats this as "absent", which triggers the create
    /// path. It must never be produced for permission failures.
    #[error("{kind} not found: {identity}")]
    NotFound {
        /// Resource kind that was looked up
        kind: String,
        /// Identity key that had no match
        identity: String,
    },

    /// Definitive provider failure (permission denied, unsupported call)
    ///
    /// Not retried and not interpreted as absence.
    #[error("provider error [{kind}]: {message}")]
    Provider {
        /// Resource kind the call was issued for
        kind: String,
        /// Description of what failed
        message: String,
    },

    /// Bad input to a create call
    #[error("validation error for {kind}: {message}")]
    Validation {
        /// Resource kind with invalid configuration
        kind: String,
        /// Description of what's invalid
        message: String,
    },

    /// An instance never reached the running state within the bounded wait
    #[error("readiness timeout for {identity}: not running after {waited_secs}s")]
    ReadinessTimeout {
        /// Identifier of the resource that never became ready
        identity: String,
        /// How long the engine waited before giving up
        waited_secs: u64,
    },

    /// A downstream node's spec requires a field an upstream result did not provide
    ///
    /// Indicates an upstream partial failure; the run halts here.
    #[error("dependency unresolved: {kind} requires {field} from {upstream}")]
    DependencyUnresolved {
        /// The kind whose spec could not be built
        kind: String,
        /// The missing field (e.g. "address")
        field: String,
        /// The upstream kind that should have produced it
        upstream: String,
    },

    /// Local filesystem error (credential persistence, manifest write)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a transient error for the given operation
    pub fn transient(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a duplicate error for a kind and identity key
    pub fn duplicate(kind: impl Into<String>, identity: impl Into<String>) -> Self {
        Self::Duplicate {
            kind: kind.into(),
            identity: identity.into(),
        }
    }

    /// Create a not-found error for a kind and identity key
    pub fn not_found(kind: impl Into<String>, identity: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            identity: identity.into(),
        }
    }

    /// Create a provider error without kind context
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider {
            kind: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a provider error for a specific resource kind
    pub fn provider_for(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            kind: kind.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error without kind context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            kind: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error for a specific resource kind
    pub fn validation_for(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            kind: kind.into(),
            message: msg.into(),
        }
    }

    /// Create a readiness-timeout error
    pub fn readiness_timeout(identity: impl Into<String>, waited_secs: u64) -> Self {
        Self::ReadinessTimeout {
            identity: identity.into(),
            waited_secs,
        }
    }

    /// Create a dependency-unresolved error
    pub fn dependency(
        kind: impl Into<String>,
        field: impl Into<String>,
        upstream: impl Into<String>,
    ) -> Self {
        Self::DependencyUnresolved {
            kind: kind.into(),
            field: field.into(),
            upstream: upstream.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Whether this error is safe to retry with backoff
    ///
    /// Only transient provider failures qualify. Everything else either
    /// requires operator action (validation, permissions) or is handled
    /// structurally (duplicate, not-found) by the reconciler.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient { .. })
    }

    /// Whether this error signals absence to a locator
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Whether this error is a duplicate-mutation rejection
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::Duplicate { .. })
    }

    /// Get the resource kind if this error is associated with one
    pub fn kind(&self) -> Option<&str> {
        match self {
            Error::Duplicate { kind, .. } => Some(kind),
            Error::NotFound { kind, .. } => Some(kind),
            Error::Provider { kind, .. } => Some(kind),
            Error::Validation { kind, .. } => Some(kind),
            Error::DependencyUnresolved { kind, .. } => Some(kind),
            _ => None,
        }
    }
}
