//! Hookwire server: drives controller instances through one dispatch.
//!
//! A dispatch binds the request to a pooled controller instance, makes sure
//! the session carries a CSRF token, runs the controller's middleware chain,
//! invokes the action (or the not-found hook), runs the after-action hook and
//! finally closes the session and restores the instance to its registered
//! defaults. Faults from any stage go through the controller's
//! `on_exception` hook; cleanup runs no matter how earlier stages ended.

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod instance;
pub mod middleware;
pub mod registry;

pub use config::DispatcherConfig;
pub use controller::{ActionContext, ActionManifest, ActionOutput, Controller, INDEX_ACTION, RESERVED_ACTIONS};
pub use dispatcher::Dispatcher;
pub use error::{ActionFault, DispatchError, RegistryError};
pub use instance::{ControllerInstance, LifecycleStage};
pub use middleware::{
    ChainOutcome, Middleware, MiddlewareRejection, MiddlewareResolver, MiddlewareUnit, run_chain,
};
pub use registry::{ActionRegistry, ControllerType};
