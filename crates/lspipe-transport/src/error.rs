use std::path::PathBuf;

/// Errors that can occur in process channel operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The executable could not be found on `PATH` or at the given path.
    #[error("program not found: {program}")]
    ProgramNotFound { program: PathBuf },

    /// The child process could not be created or the executable could not be run.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    /// Failed to configure a pipe endpoint after spawn.
    #[error("failed to configure pipe: {0}")]
    Configure(std::io::Error),

    /// An I/O error occurred on one of the pipe endpoints.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The pipe endpoint has already been closed by this side.
    #[error("pipe endpoint closed")]
    Closed,
}

impl TransportError {
    /// True when the child is gone and the write side can no longer deliver bytes.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, TransportError::Io(err) if err.kind() == std::io::ErrorKind::BrokenPipe)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
