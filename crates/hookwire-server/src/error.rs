//! Registration, lifecycle and dispatch errors.

use hookwire_protocol::HandlerError;
use hookwire_session::SessionError;
use thiserror::Error;

use crate::instance::LifecycleStage;

/// A controller type could not be registered. Raised at startup, never
/// during a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("controller type name must not be empty")]
    EmptyTypeName,

    #[error("invalid controller type name `{0}`")]
    InvalidTypeName(String),

    #[error("invalid action name `{action}` on {type_name}")]
    InvalidActionName { type_name: String, action: String },

    #[error("action `{action}` is declared twice on {type_name}")]
    DuplicateAction { type_name: String, action: String },

    #[error("{type_name} uses unknown middleware `{middleware}`")]
    UnknownMiddleware { type_name: String, middleware: String },

    #[error("controller `{0}` is already registered")]
    DuplicateController(String),
}

/// A fault raised while driving a controller through a dispatch.
///
/// Every fault is offered to [`Controller::on_exception`](crate::Controller::on_exception)
/// before it can reach the caller.
#[derive(Debug, Error)]
pub enum ActionFault {
    #[error("CSRF setup failed: {0}")]
    Csrf(#[source] SessionError),

    #[error("middleware `{0}` could not be resolved")]
    UnresolvedMiddleware(String),

    #[error("action `{action}` failed: {error:#}")]
    Action { action: String, error: anyhow::Error },

    #[error("not-found hook for `{action}` failed: {error:#}")]
    NotFound { action: String, error: anyhow::Error },

    #[error("after-action hook for `{action}` failed: {error:#}")]
    AfterAction { action: String, error: anyhow::Error },

    #[error("session close failed: {0}")]
    Cleanup(#[source] SessionError),

    #[error("panic during {stage}: {message}")]
    Panicked { stage: LifecycleStage, message: String },
}

impl ActionFault {
    /// Lifecycle stage the fault was raised in.
    pub fn stage(&self) -> LifecycleStage {
        match self {
            Self::Csrf(_) => LifecycleStage::CsrfSetup,
            Self::UnresolvedMiddleware(_) => LifecycleStage::Middleware,
            Self::Action { .. } => LifecycleStage::Action,
            Self::NotFound { .. } => LifecycleStage::NotFound,
            Self::AfterAction { .. } => LifecycleStage::AfterAction,
            Self::Cleanup(_) => LifecycleStage::Cleanup,
            Self::Panicked { stage, .. } => *stage,
        }
    }
}

/// Why [`Dispatcher::dispatch`](crate::Dispatcher::dispatch) returned no forward path.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("controller not found: {0}")]
    ControllerNotFound(String),

    #[error(transparent)]
    Fault(#[from] ActionFault),
}

impl From<DispatchError> for HandlerError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::ControllerNotFound(name) => HandlerError::ControllerNotFound(name),
            DispatchError::Fault(fault) => HandlerError::Unhandled(fault.to_string()),
        }
    }
}
