//! Child process stdio channel.
//!
//! Spawns an executable with its stdin and stdout connected to two pipes and hands the
//! parent a blocking write end and a non-blocking read end. SIGPIPE is neutralized for
//! as long as a channel is alive, so a child that exits early turns writes into errors.
//!
//! This is the lowest layer of lspipe. Framing builds on the [`PipeReader`] and
//! [`PipeWriter`] types provided here.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod process;
#[cfg(unix)]
pub mod signal;

pub use error::{Result, TransportError};
pub use traits::{ReadStatus, TryRead};

#[cfg(unix)]
pub use process::{
    resolve_program, ChildProcess, PipeReader, PipeWriter, ProcessChannel, SpawnConfig,
};
#[cfg(unix)]
pub use signal::SigpipeGuard;
