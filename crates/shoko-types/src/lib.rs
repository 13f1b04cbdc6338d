//! Shared wire types for shoko.
//!
//! This crate is the contract between `shoko-server` and `shoko-client`: the
//! frames that cross the connection, the error kinds a call can fail with, and
//! the well-known service location. It has **no internal shoko dependencies**.
//!
//! # Key Types
//!
//! |----------------------|---------------------------------------------|
//! | Type                 | Purpose                                     |
//! |----------------------|---------------------------------------------|
//! | [`ClientFrame`]      | Client → server call (id + request)         |
//! | [`ServerFrame`]      | Server → client reply or cache push         |
//! | [`Request`]          | One file-service operation                  |
//! | [`Reply`]            | Outcome of a request                        |
//! | [`ErrorKind`]        | Failure taxonomy shared by both sides       |
//! | [`WireError`]        | Error kind + message as sent on the wire    |
//! |----------------------|---------------------------------------------|

pub mod error;
pub mod wire;

pub use error::{CodecError, ErrorKind, WireError};
pub use wire::{ClientFrame, Reply, Request, ServerFrame, decode, encode};

/// Default port of the service registry.
pub const DEFAULT_REGISTRY_PORT: u16 = 5099;

/// Well-known name the file service is bound under.
pub const SERVICE_NAME: &str = "fileService";
