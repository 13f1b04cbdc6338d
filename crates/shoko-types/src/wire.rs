//! Frames exchanged over a shoko connection.
//!
//! A connection carries two independent flows on one byte stream:
//!
//! ```text
//! client ── ClientFrame::Call { id, request } ──────────────► server
//! client ◄── ServerFrame::Reply { id, reply } ─────────────── server
//! client ◄── ServerFrame::InvalidateCache { name } ────────── server (push)
//! client ◄── ServerFrame::InvalidateAll ───────────────────── server (push)
//! ```
//!
//! Replies are correlated by `id` and may arrive out of order. Pushes are
//! unsolicited and carry no id. Frame bodies are postcard-encoded; length
//! framing is the transport's business.
//!
//! Request fields are `Option` so that a missing name or payload can be
//! expressed and rejected with [`ErrorKind::InvalidArgument`](crate::ErrorKind).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, WireError};

/// A file-service operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Bind the session to a named service. Must precede all other calls.
    Lookup { service: String },
    Create {
        name: Option<String>,
        data: Option<Vec<u8>>,
    },
    Delete { name: Option<String> },
    Read { name: Option<String> },
    Modify {
        name: Option<String>,
        data: Option<Vec<u8>>,
    },
    Rename {
        name: Option<String>,
        new_name: Option<String>,
    },
    List,
    /// Subscribe this connection to cache invalidations under `identity`.
    Register { identity: Option<String> },
}

impl Request {
    /// Operation name for logging.
    pub fn op(&self) -> &'static str {
        match self {
            Request::Lookup { .. } => "lookup",
            Request::Create { .. } => "create",
            Request::Delete { .. } => "delete",
            Request::Read { .. } => "read",
            Request::Modify { .. } => "modify",
            Request::Rename { .. } => "rename",
            Request::List => "list",
            Request::Register { .. } => "register",
        }
    }
}

/// Outcome of a [`Request`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Ack,
    Data(Vec<u8>),
    Names(Vec<String>),
    Error(WireError),
}

impl From<Result<(), WireError>> for Reply {
    fn from(result: Result<(), WireError>) -> Self {
        match result {
            Ok(()) => Reply::Ack,
            Err(e) => Reply::Error(e),
        }
    }
}

/// Client → server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientFrame {
    Call { id: u64, request: Request },
}

/// Server → client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerFrame {
    Reply { id: u64, reply: Reply },
    /// Drop any locally cached copy of `name`.
    InvalidateCache { name: String },
    /// Some invalidations could not be queued; drop everything cached.
    InvalidateAll,
}

/// Encode a frame body.
pub fn encode<T: Serialize>(frame: &T) -> Result<Vec<u8>, CodecError> {
    Ok(postcard::to_stdvec(frame)?)
}

/// Decode a frame body.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(postcard::from_bytes(bytes)?)
}
