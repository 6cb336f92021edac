//! Talk Content-Length framed messages to a child process over stdio.
//!
//! lspipe spawns an executable (typically a language server) with its stdin and stdout
//! connected to pipes, and exchanges `Content-Length: <n>\r\n\r\n<body>` frames with it.
//!
//! # Crate Structure
//!
//! - [`transport`]: child process spawning and the raw pipe ends
//! - [`frame`]: Content-Length framing over non-blocking streams
//! - [`peer`]: send/poll/shutdown on a spawned child (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use lspipe_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use lspipe_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use lspipe_peer::*;
}
