//! Session cookie configuration.

use std::time::Duration;

/// Idle time after which a stored session is discarded.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(1440);

/// Session cookie settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cookie carrying the session id
    pub cookie_name: String,
    /// `Path` attribute of the issued cookie
    pub cookie_path: String,
    /// Sessions untouched for this long are dropped by the in-memory store
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "HOOKSESSID".into(),
            cookie_path: "/".into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}
