//! Executor configuration.

use procstream_host::HostConfig;
use serde::{Deserialize, Serialize};

/// Default capacity of the data source event queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Default upper bound for buffered error-stream text.
pub const DEFAULT_MAX_ERROR_BYTES: usize = 10 * 1024 * 1024; // 10 MB

/// Configuration shared by every command run through one executor.
///
/// All fields have defaults, so a partial document deserializes:
///
/// ```
/// let config: procstream::config::ExecutorConfig =
///     serde_json::from_str(r#"{ "max_error_bytes": 4096 }"#).unwrap();
/// assert_eq!(config.channel_capacity, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Bounded size of the event queue between a data source and its work token.
    ///
    /// Default: 100 events.
    pub channel_capacity: usize,

    /// Maximum number of bytes of error-stream text kept for the final error.
    ///
    /// Fragments beyond the limit are dropped and the resulting error is
    /// flagged as truncated. Default: 10 MB.
    pub max_error_bytes: usize,

    /// Settings for the spawned processes.
    pub host: HostConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_error_bytes: DEFAULT_MAX_ERROR_BYTES,
            host: HostConfig::default(),
        }
    }
}

impl ExecutorConfig {
    /// Create a new `ExecutorConfig` with default settings.
    ///
    /// Equivalent to `ExecutorConfig::default()`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
