//! Error taxonomy shared by every component.
//!
//! Each [`Error`] variant maps to exactly one [`ErrorKind`], which is what a
//! presentation layer switches on (HTTP status, exit code, etc.).

use serde::Serialize;

use crate::catalog::CatalogError;
use crate::references::ReferenceCounts;

/// Caller-inspectable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Guardrail, tool, workload or association is absent.
    NotFound,
    /// Duplicate key, rename collision, or deletion blocked by references.
    Conflict,
    /// Field bounds, pattern or enumeration violation.
    InvalidArgument,
    /// The authorization gate rejected the mutation.
    PermissionDenied,
    /// The record is protected by its provenance.
    Forbidden,
    /// Unexpected store failure.
    Internal,
}

impl ErrorKind {
    /// Stable lowercase identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InvalidArgument => "invalid_argument",
            Self::PermissionDenied => "permission_denied",
            Self::Forbidden => "forbidden",
            Self::Internal => "internal",
        }
    }
}

/// Why the mutation gate refused a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// The authorizer evaluated the request and said no.
    Policy(String),
    /// The authorizer could not be consulted. Mutations fail closed.
    ProviderUnavailable(String),
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Policy(reason) => write!(f, "denied by policy: {reason}"),
            Self::ProviderUnavailable(reason) => {
                write!(f, "authorization provider unavailable: {reason}")
            }
        }
    }
}

/// Errors returned by registry, association and propagation operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The named entity does not exist.
    #[error("{what} not found: {key}")]
    NotFound {
        /// Entity kind, e.g. `"guardrail"`.
        what: &'static str,
        /// Human-readable key.
        key: String,
    },

    /// A uniqueness rule was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The guardrail is still referenced by associations.
    #[error("cannot delete: {} tool(s), {} workload-tool relationship(s)", .counts.tool, .counts.workload_tool)]
    InUse {
        /// `namespace/name` of the guardrail.
        guardrail: String,
        /// Live reference counts at the time of the check.
        counts: ReferenceCounts,
    },

    /// A field failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidArgument {
        /// Offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The mutation gate refused the call.
    #[error("permission denied: {0}")]
    PermissionDenied(Denial),

    /// An inherited association cannot be changed at the workload level.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A stored value could not be decoded.
    #[error("corrupt {field} value in store: {value:?}")]
    Corrupt {
        /// Column that held the bad value.
        field: &'static str,
        /// The unexpected value.
        value: String,
    },

    /// The tool/workload catalog could not be consulted.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A filesystem operation on the store's location failed.
    #[error("cannot prepare {}: {source}", .path.display())]
    Io {
        /// Path that could not be created or accessed.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) | Self::InUse { .. } => ErrorKind::Conflict,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Corrupt { .. } | Self::Catalog(_) | Self::Io { .. } | Self::Database(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn not_found(what: &'static str, key: impl std::fmt::Display) -> Self {
        Self::NotFound {
            what,
            key: key.to_string(),
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}

/// Map a unique-constraint violation to [`Error::Conflict`], passing every
/// other database error through.
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: impl FnOnce() -> String) -> Error {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => Error::Conflict(message()),
        _ => Error::Database(err),
    }
}

/// Shorthand result type.
pub type Result<T> = std::result::Result<T, Error>;
