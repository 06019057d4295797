//! Session errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session store failure: {0}")]
    Store(String),

    #[error("session has not been started")]
    NotStarted,

    #[error("session is already closed")]
    Closed,

    #[error("invalid session cookie: {0}")]
    Cookie(String),
}
