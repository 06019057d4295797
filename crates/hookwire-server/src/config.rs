//! Dispatcher configuration.

use hookwire_session::{CSRF_TOKEN_KEY, SessionConfig};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Session key holding the CSRF token
    pub csrf_key: String,
    /// Idle instances kept per controller type (0 disables pooling)
    pub pool_capacity: usize,
    /// Session cookie settings
    pub session: SessionConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            csrf_key: CSRF_TOKEN_KEY.into(),
            pool_capacity: 64,
            session: SessionConfig::default(),
        }
    }
}
