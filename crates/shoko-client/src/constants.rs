//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default server host for local development.
pub const DEFAULT_HOST: &str = "localhost";

/// Default server port.
pub const DEFAULT_PORT: u16 = shoko_types::DEFAULT_REGISTRY_PORT;

/// Timeout for TCP connect plus service lookup.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a single call, from send to reply.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffered server events per subscriber before it starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Outbound frames buffered before callers wait on the socket.
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Largest frame accepted or sent, in bytes.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;
