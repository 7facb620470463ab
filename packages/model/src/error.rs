//! Error types for the model layer.
//!
//! Errors here are semantic: a value that cannot be represented, an
//! iteration source used twice, a lookup with an incompatible key. Errors
//! about settings or singleton construction belong in higher layers.

use thiserror::Error;

/// Errors produced by wrapping, unwrapping, and model access.
///
/// All of these propagate to the immediate caller; none are retried
/// automatically. They carry enough structured context (key, type name,
/// operation) for the layer above to render a diagnostic.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A host value cannot be represented in the semantic value model.
    ///
    /// Raised when a recognized container holds an element that itself fails
    /// to wrap, or when a restrictive wrapper deliberately refuses a type.
    /// Never silently converted to null or empty.
    #[error("cannot wrap value of type {type_name}: {reason}")]
    WrapFailure {
        /// Host-side type description of the offending value.
        type_name: &'static str,
        /// Why the wrap was refused or failed.
        reason: String,
    },

    /// A single-consumption iteration source was used by a second cursor.
    #[error("iteration source has already been consumed by another cursor")]
    AlreadyConsumed,

    /// A container lookup used a key of a type the host container rejects.
    #[error("lookup key {key:?} of kind {key_kind} is incompatible with {container}")]
    LookupTypeMismatch {
        /// Display form of the offending key or value.
        key: String,
        /// Kind of the key (e.g. "char", "string", "method model").
        key_kind: &'static str,
        /// The container that rejected it.
        container: &'static str,
    },

    /// A shared host container's lock was poisoned by a panicking writer.
    #[error("host container lock poisoned during {operation}")]
    HostPoisoned {
        /// The operation that observed the poison.
        operation: &'static str,
    },

    /// The operation is not supported by this model.
    #[error("{model} does not support {operation}")]
    Unsupported {
        /// The model kind the operation was attempted on.
        model: &'static str,
        /// The unsupported operation.
        operation: &'static str,
    },

    /// A callable model failed while executing.
    #[error("method call failed: {0}")]
    MethodFailure(String),
}

impl ModelError {
    /// Shorthand for a [`ModelError::WrapFailure`].
    pub fn wrap_failure(type_name: &'static str, reason: impl Into<String>) -> Self {
        ModelError::WrapFailure {
            type_name,
            reason: reason.into(),
        }
    }
}
