//! Error kinds shared by server and client.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Why a call failed.
///
/// The first three kinds come from the file store itself. The rest are
/// produced by the session layer before a request ever reaches the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ErrorKind {
    /// A required name or data field was missing.
    InvalidArgument,
    /// No live file is bound to the name.
    NotFound,
    /// The target name is already bound.
    AlreadyExists,
    /// Lookup named a service this server does not export.
    UnknownService,
    /// A file call arrived before a successful lookup.
    NotBound,
    /// The server failed to run the call.
    Internal,
}

/// An error as carried inside [`Reply::Error`](crate::Reply::Error).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
}

impl WireError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a missing request field.
    pub fn missing(field: &str) -> Self {
        Self::new(ErrorKind::InvalidArgument, format!("missing required field `{field}`"))
    }
}

/// Frame body could not be encoded or decoded.
#[derive(Debug, Error)]
#[error("codec error: {0}")]
pub struct CodecError(#[from] postcard::Error);

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_error_kind_display_is_snake_case() {
        assert_eq!(ErrorKind::AlreadyExists.to_string(), "already_exists");
        assert_eq!(ErrorKind::from_str("NOT_FOUND").unwrap(), ErrorKind::NotFound);
    }

    #[test]
    fn test_wire_error_message() {
        let err = WireError::missing("name");
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert_eq!(err.to_string(), "invalid_argument: missing required field `name`");
    }
}
