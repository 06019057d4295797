//! The controller contract: manifest, action invocation and lifecycle hooks.

use std::future::Future;
use std::sync::Arc;

use hookwire_protocol::{JsonEnvelope, ProtocolError, Request, Response};
use hookwire_session::{Session, SessionConfig, SharedSessionStore};
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ActionFault;

/// Action served when a path names only the controller.
pub const INDEX_ACTION: &str = "index";

/// Names that never become invokable actions, even when declared.
pub const RESERVED_ACTIONS: &[&str] = &[
    "new",
    "default",
    "drop",
    "clone",
    "clone_from",
    "fmt",
    "to_string",
    "call",
    "invoke",
    "serialize",
    "deserialize",
    "manifest",
    "hook",
    "gc",
    "on_request",
    "action_not_found",
    "after_action",
    "on_exception",
];

/// True for names in [`RESERVED_ACTIONS`] and any `__`-prefixed name.
pub fn is_reserved_action(name: &str) -> bool {
    name.starts_with("__") || RESERVED_ACTIONS.contains(&name)
}

/// What an action returns: an optional forward path for the caller to re-route to.
pub type ActionOutput = anyhow::Result<Option<String>>;

// ─────────────────────────────────────────────────────────────────────────────
// Manifest
// ─────────────────────────────────────────────────────────────────────────────

/// Static declaration of a controller type.
///
/// ```
/// use hookwire_server::ActionManifest;
///
/// let manifest = ActionManifest::new("User")
///     .actions(["index", "profile", "login"])
///     .middleware("Auth")
///     .except("login");
/// assert_eq!(manifest.middleware_except(), ["User::login"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ActionManifest {
    type_name: String,
    actions: Vec<String>,
    middleware: Vec<String>,
    middleware_except: Vec<String>,
}

impl ActionManifest {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn action(mut self, name: impl Into<String>) -> Self {
        self.actions.push(name.into());
        self
    }

    pub fn actions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(names.into_iter().map(Into::into));
        self
    }

    /// Append a middleware identifier. Chain order is declaration order.
    pub fn middleware(mut self, id: impl Into<String>) -> Self {
        self.middleware.push(id.into());
        self
    }

    /// Skip the whole middleware chain for `action`. A bare action name is
    /// qualified with this type's name; `Type::action` is taken as is.
    pub fn except(mut self, action: impl Into<String>) -> Self {
        let action = action.into();
        let qualified = if action.contains(hookwire_protocol::action::QUALIFIER_SEPARATOR) {
            action
        } else {
            hookwire_protocol::QualifiedAction::new(&self.type_name, &action).as_str().to_string()
        };
        self.middleware_except.push(qualified);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn declared_actions(&self) -> &[String] {
        &self.actions
    }

    pub fn middleware_ids(&self) -> &[String] {
        &self.middleware
    }

    pub fn middleware_except(&self) -> &[String] {
        &self.middleware_except
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-dispatch context
// ─────────────────────────────────────────────────────────────────────────────

/// Opens sessions against the dispatcher's store.
#[derive(Clone)]
pub(crate) struct SessionSource {
    pub(crate) store: SharedSessionStore,
    pub(crate) config: Arc<SessionConfig>,
}

impl SessionSource {
    fn open(&self, request: &Request, response: &Response) -> Session {
        Session::new(self.store.clone(), self.config.clone(), request, response.clone())
    }
}

/// Handles bound to a controller instance for one dispatch.
///
/// The session is created on first use and closed by the dispatcher during
/// cleanup; the whole context is dropped before the instance is reused.
pub struct ActionContext {
    action: String,
    request: Request,
    response: Response,
    session: Option<Session>,
    sessions: SessionSource,
}

impl ActionContext {
    pub(crate) fn new(action: &str, request: Request, response: Response, sessions: SessionSource) -> Self {
        Self {
            action: action.to_string(),
            request,
            response,
            session: None,
            sessions,
        }
    }

    /// Standalone context, for exercising a controller outside a dispatcher.
    pub fn detached(
        action: &str,
        request: Request,
        response: Response,
        store: SharedSessionStore,
        config: SessionConfig,
    ) -> Self {
        let sessions = SessionSource {
            store,
            config: Arc::new(config),
        };
        Self::new(action, request, response, sessions)
    }

    /// The action being served.
    pub fn action_name(&self) -> &str {
        &self.action
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// The dispatch's session, created on first call.
    pub fn session(&mut self) -> &mut Session {
        let Self {
            request,
            response,
            session,
            sessions,
            ..
        } = self;
        session.get_or_insert_with(|| sessions.open(request, response))
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Request, response and (lazily created) session borrowed together.
    pub fn parts(&mut self) -> (&Request, &Response, &mut Session) {
        let Self {
            request,
            response,
            session,
            sessions,
            ..
        } = self;
        let session = session.get_or_insert_with(|| sessions.open(request, response));
        (&*request, &*response, session)
    }

    /// Write a `{code, result, msg}` envelope unless the response already ended.
    pub fn write_json(&self, status: StatusCode, result: impl Into<Value>, msg: impl Into<Value>) -> bool {
        self.response
            .write_json(&JsonEnvelope::new(status.as_u16(), result, msg))
    }

    /// Decode the request body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        self.request.json()
    }

    /// Decode the request body as XML.
    pub fn xml<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        self.request.xml()
    }

    pub(crate) fn take_session(&mut self) -> Option<Session> {
        self.session.take()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

/// A route target.
///
/// The implementing struct's fields are its resettable state: the prototype
/// passed to [`Dispatcher::register`](crate::Dispatcher::register) is kept as
/// the default snapshot and cloned back over the instance after every
/// dispatch. State meant to be shared across dispatches belongs behind an
/// `Arc`, which the snapshot shares rather than resets.
pub trait Controller: Clone + Send + Sync + 'static {
    /// Type name, invokable actions and middleware of this controller.
    fn manifest() -> ActionManifest;

    /// Run `action`. Only called for names in the registered allowed set.
    fn call(
        &mut self,
        action: &str,
        cx: &mut ActionContext,
    ) -> impl Future<Output = ActionOutput> + Send;

    /// Called instead of [`call`](Self::call) for unknown actions.
    fn action_not_found(
        &mut self,
        _action: &str,
        cx: &mut ActionContext,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        cx.response().with_status(StatusCode::NOT_FOUND);
        async { Ok(()) }
    }

    /// Runs after the action on every path, including faults and rejections.
    fn after_action(
        &mut self,
        _action: &str,
        _cx: &mut ActionContext,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        async { Ok(()) }
    }

    /// Decide what happens to a fault. Returning `Err` hands it to the caller
    /// of the dispatcher, replacing any fault re-raised earlier in the same
    /// dispatch; returning `Ok` swallows it. A panic here is escalated too.
    fn on_exception(&mut self, fault: ActionFault, _cx: &mut ActionContext) -> Result<(), ActionFault> {
        Err(fault)
    }
}
