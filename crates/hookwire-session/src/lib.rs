//! Hookwire sessions.
//!
//! A [`Session`] is opened lazily by a dispatch, explicitly started, read and
//! written as a key/value map, and closed (persisted) before the dispatch
//! returns its controller instance. Persistence goes through the
//! [`SessionStore`] trait; [`MemorySessionStore`] is the in-process backend.

pub mod config;
pub mod csrf;
pub mod error;
pub mod session;
pub mod store;

pub use config::{DEFAULT_IDLE_TIMEOUT, SessionConfig};
pub use csrf::{CSRF_TOKEN_KEY, ensure_csrf_token, generate_token};
pub use error::SessionError;
pub use session::{Session, SessionState};
pub use store::{MemorySessionStore, SessionData, SessionStore, SessionStoreDyn, SharedSessionStore};
