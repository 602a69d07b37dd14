use thiserror::Error;

/// Errors returned by process host operations.
#[derive(Debug, Error)]
pub enum HostError {
    /// The program could not be located on disk or on `$PATH`.
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),

    /// `$PATH` lookup failed.
    #[error("Executable not found: {0}")]
    WhichError(#[from] which::Error),

    /// The argument string could not be split into words.
    #[error("Invalid argument string: {0}")]
    InvalidArguments(String),

    /// An OS-level process operation failed.
    #[error("Process operation failed at stage '{stage}': {source}")]
    SpawnFailed {
        /// Which step failed (`spawn`, `wait`, `SIGKILL`, ...).
        stage: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Sending a signal to the child failed.
    #[error("Failed to send signal {signal} to PID {pid}: {reason}")]
    SignalFailed {
        /// Signal name.
        signal: String,
        /// Target process id.
        pid: u32,
        /// Reason reported by the OS.
        reason: String,
    },

    /// Child process stdout was not captured.
    #[error("Child process stdout was not captured")]
    NoStdout,

    /// Child process stderr was not captured.
    #[error("Child process stderr was not captured")]
    NoStderr,

    /// The child exited before its PID could be read.
    #[error("Could not get PID from child process")]
    NoPid,

    /// The host was used after `dispose`.
    #[error("Process host has already been disposed")]
    Disposed,

    /// Anything else, e.g. a failure injected by a test host.
    #[error("Other error: {0}")]
    Other(String),
}
