//! Store error types.

use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by a [`DataStore`](crate::DataStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row with the given id.
    #[error("{table} record {id} not found")]
    NotFound {
        /// Table name.
        table: &'static str,
        /// Requested id.
        id: i64,
    },

    /// A `NOT NULL`, `UNIQUE` or foreign key constraint was violated.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// An input value could not be converted to its column type.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidField {
        /// Column name.
        field: String,
        /// What was wrong.
        reason: String,
    },

    /// The database could not be reached.
    #[error("database connection failed: {0}")]
    Connection(String),

    /// Any other query failure.
    #[error("query failed: {0}")]
    Query(String),
}

impl StoreError {
    pub(crate) fn empty_update() -> Self {
        Self::InvalidField {
            field: "body".to_string(),
            reason: "no updatable fields".to_string(),
        }
    }

    /// Returns `true` for [`StoreError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for errors caused by the input rather than the backend.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Constraint(_) | Self::InvalidField { .. }
        )
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Constraint(_) => "constraint_violation",
            Self::InvalidField { .. } => "invalid_field",
            Self::Connection(_) => "store_unavailable",
            Self::Query(_) => "query_failed",
        }
    }
}
