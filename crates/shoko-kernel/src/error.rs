//! Store error types.

use shoko_types::{ErrorKind, WireError};
use thiserror::Error;

/// File store error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A required name or payload was missing.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No live file is bound to the name.
    #[error("no file named \"{0}\"")]
    NotFound(String),

    /// The name is already bound.
    #[error("file \"{0}\" already exists")]
    AlreadyExists(String),
}

impl StoreError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a NotFound error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists(name.into())
    }

    /// The wire-level kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::AlreadyExists(_) => ErrorKind::AlreadyExists,
        }
    }
}

impl From<StoreError> for WireError {
    fn from(e: StoreError) -> Self {
        WireError::new(e.kind(), e.to_string())
    }
}

/// Store result type.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(StoreError::not_found("a").kind(), ErrorKind::NotFound);
        assert_eq!(StoreError::already_exists("a").kind(), ErrorKind::AlreadyExists);
        assert_eq!(StoreError::invalid_argument("x").kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_into_wire_error() {
        let wire: WireError = StoreError::not_found("report.txt").into();
        assert_eq!(wire.kind, ErrorKind::NotFound);
        assert_eq!(wire.message, "no file named \"report.txt\"");
    }
}
