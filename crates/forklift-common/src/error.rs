//! Error types for the migration orchestrator
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the object it concerns (`Kind/namespace/name`) and
//! the underlying cause, and falls into exactly one [`ErrorClass`] which
//! decides whether the reconciliation driver retries it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crd::ObservedPhase;

/// Main error type for migration operations
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input; never retried
    #[error("validation error for {object}: {message}")]
    Validation {
        /// Object (or request) with invalid configuration
        object: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "source.host")
        field: Option<String>,
    },

    /// Name collision with a divergent spec
    #[error("conflict on {object}: {message}")]
    Conflict {
        /// Object whose name is already taken
        object: String,
        /// Description of the divergence
        message: String,
    },

    /// Object does not exist in the backend
    #[error("{object} not found")]
    NotFound {
        /// Object that was looked up
        object: String,
    },

    /// Network or backend hiccup; safe to retry
    #[error("transient error [{context}]: {message}")]
    Transient {
        /// Operation that failed (e.g., "create", "get")
        context: String,
        /// Description of what failed
        message: String,
    },

    /// Overall wait budget exceeded
    #[error("timed out after {budget:?} waiting for {object}")]
    Timeout {
        /// Object being waited on
        object: String,
        /// The budget that was exhausted
        budget: Duration,
        /// Phase observed on the last successful read, if any
        last_phase: Option<ObservedPhase>,
    },

    /// Permission or schema rejection; never retried
    #[error("fatal error [{context}]: {message}")]
    Fatal {
        /// Operation that failed
        context: String,
        /// Description of what failed
        message: String,
    },

    /// Caller-initiated cancellation
    #[error("cancelled while reconciling {object}")]
    Cancelled {
        /// Object being reconciled when the signal arrived
        object: String,
    },

    /// The external controller reported a failure condition
    #[error("{object} failed: {reason}")]
    StageFailed {
        /// Object that failed
        object: String,
        /// Reason/message copied from the failing status condition
        reason: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

/// Coarse classification of an [`Error`], recorded in workflow state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Bad input
    Validation,
    /// Name collision with divergent spec
    Conflict,
    /// Object missing
    NotFound,
    /// Retryable backend hiccup
    Transient,
    /// Wait budget exceeded
    Timeout,
    /// Permission/schema rejection or controller-reported failure
    Fatal,
    /// Caller-initiated cancellation
    Cancelled,
    /// Bug or unexpected state
    Internal,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Validation => "ValidationError",
            Self::Conflict => "ConflictError",
            Self::NotFound => "NotFoundError",
            Self::Transient => "TransientError",
            Self::Timeout => "TimeoutError",
            Self::Fatal => "FatalError",
            Self::Cancelled => "CancelledError",
            Self::Internal => "InternalError",
        };
        f.write_str(s)
    }
}

impl Error {
    /// Create a validation error with object context and field path
    pub fn validation_for_field(
        object: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            object: object.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a conflict error for an object
    pub fn conflict(object: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Conflict {
            object: object.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error for an object
    pub fn not_found(object: impl Into<String>) -> Self {
        Self::NotFound {
            object: object.into(),
        }
    }

    /// Create a transient (retryable) error
    pub fn transient(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transient {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create a fatal (non-retryable) backend error
    pub fn fatal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fatal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error carrying the last observed phase
    pub fn timeout(
        object: impl Into<String>,
        budget: Duration,
        last_phase: Option<ObservedPhase>,
    ) -> Self {
        Self::Timeout {
            object: object.into(),
            budget,
            last_phase,
        }
    }

    /// Create a cancellation error
    pub fn cancelled(object: impl Into<String>) -> Self {
        Self::Cancelled {
            object: object.into(),
        }
    }

    /// Create an error for a controller-reported failure
    pub fn stage_failed(object: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StageFailed {
            object: object.into(),
            reason: reason.into(),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Classify a kube-rs error raised while operating on `object`.
    ///
    /// 409 maps to `Conflict`, 404 to `NotFound`, 408/429/5xx and
    /// connection-level failures to `Transient`; every other API rejection
    /// (400, 401, 403, 405, 422, ...) and malformed payloads are `Fatal`.
    pub fn from_kube(object: impl Into<String>, err: kube::Error) -> Self {
        let object = object.into();
        match &err {
            kube::Error::Api(ae) => match ae.code {
                409 => Self::conflict(object, ae.message.clone()),
                404 => Self::not_found(object),
                408 | 429 => Self::transient(object, err.to_string()),
                code if code >= 500 => Self::transient(object, err.to_string()),
                _ => Self::fatal(object, err.to_string()),
            },
            kube::Error::SerdeError(_) => Self::fatal(object, err.to_string()),
            _ => Self::transient(object, err.to_string()),
        }
    }

    /// The class this error falls into
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Validation { .. } => ErrorClass::Validation,
            Error::Conflict { .. } => ErrorClass::Conflict,
            Error::NotFound { .. } => ErrorClass::NotFound,
            Error::Transient { .. } => ErrorClass::Transient,
            Error::Timeout { .. } => ErrorClass::Timeout,
            Error::Fatal { .. } => ErrorClass::Fatal,
            Error::Cancelled { .. } => ErrorClass::Cancelled,
            Error::StageFailed { .. } => ErrorClass::Fatal,
            Error::Serialization { .. } => ErrorClass::Fatal,
            Error::Internal { .. } => ErrorClass::Internal,
        }
    }

    /// Check if this error is retryable
    ///
    /// Only transient errors are retried; everything else requires either a
    /// config fix or human inspection of the backend.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Phase observed before a timeout, if this is a timeout error
    pub fn last_phase(&self) -> Option<ObservedPhase> {
        match self {
            Error::Timeout { last_phase, .. } => *last_phase,
            _ => None,
        }
    }
}
