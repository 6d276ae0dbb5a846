use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("executable not found: {0}")]
    NotFound(String),

    #[error("not an executable file: {}", .0.display())]
    NotExecutable(PathBuf),

    #[error("{0}")]
    InvalidUrl(String),

    #[error("failed to start '{command}': {source}")]
    SpawnRejected {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no process id for '{0}'")]
    NoProcessId(String),

    #[error("failed to signal pid {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    #[error("unsupported on this platform: {0}")]
    Unsupported(&'static str),
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
