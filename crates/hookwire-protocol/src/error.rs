//! Protocol-level error types.

use thiserror::Error;

/// Failures while reading or shaping request/response data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("request body is not valid XML: {0}")]
    InvalidXml(#[from] quick_xml::DeError),

    #[error("invalid forward path `{0}`")]
    InvalidForwardPath(String),
}

/// What the dispatcher reports back to the transport when a dispatch did not
/// produce a response on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// No controller is registered under the requested name.
    #[error("controller not found: {0}")]
    ControllerNotFound(String),

    /// A fault escaped the controller's exception hook.
    #[error("unhandled fault: {0}")]
    Unhandled(String),
}

impl HandlerError {
    /// HTTP status the transport answers with.
    pub fn status(&self) -> http::StatusCode {
        match self {
            Self::ControllerNotFound(_) => http::StatusCode::NOT_FOUND,
            Self::Unhandled(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result of one dispatch as seen by the transport: an optional forward path.
pub type HandlerResult = Result<Option<String>, HandlerError>;
