//! Server configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

/// Default port for the file service.
pub const DEFAULT_PORT: u16 = shoko_types::DEFAULT_REGISTRY_PORT;

/// Default bind address (localhost only).
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Invalidations queued per connection before they collapse into one
/// invalidate-all push.
pub const DEFAULT_PUSH_QUEUE_DEPTH: usize = 256;

/// Replies queued per connection before store workers wait on the writer.
pub const DEFAULT_REPLY_QUEUE_DEPTH: usize = 256;

/// Largest frame accepted or sent, in bytes.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;
