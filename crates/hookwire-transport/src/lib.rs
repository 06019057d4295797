//! Hookwire Transport Layer
//!
//! Serves controllers over HTTP with axum. The transport handles:
//! - Mapping request paths onto `(controller, action)` pairs
//! - Following forward paths returned by actions
//! - Turning dispatch failures into HTTP replies
//! - A `/health` endpoint
//!
//! The transport is decoupled from dispatch logic via the `RequestHandler` trait.

pub mod route;
pub mod server;

pub use route::split_path;
pub use server::{RequestHandler, ServeError, TransportConfig, TransportServer, router};
