//! Hookwire protocol types.
//!
//! The request/response handles a controller sees during one dispatch, the
//! JSON envelope used for framework-generated replies, and the error types
//! shared between the dispatcher and the transport layer.

pub mod action;
pub mod envelope;
pub mod error;
pub mod message;

pub use action::QualifiedAction;
pub use envelope::JsonEnvelope;
pub use error::{HandlerError, HandlerResult, ProtocolError};
pub use message::{Request, Response};
