//! Spawned-process peers speaking Content-Length framed messages.
//!
//! This is the "just works" layer. Spawn a child, send and poll for frames,
//! then shut it down gracefully with an optional JSON-RPC shutdown/exit exchange.

pub mod backoff;
pub mod control;
pub mod error;
pub mod peer;
pub mod shutdown;
pub mod spawner;

pub use backoff::{Backoff, BackoffTimer};
pub use control::{is_response_to, ControlMessage, JSONRPC_VERSION, METHOD_EXIT, METHOD_SHUTDOWN};
pub use error::{PeerError, Result};
pub use peer::{Peer, PeerConfig};
pub use shutdown::{negotiate, ShutdownConfig, ShutdownProtocol, ShutdownReport};
pub use spawner::{spawn, spawn_with_config};
