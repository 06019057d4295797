//! Middleware chain run before every action.
//!
//! Units run in declaration order and the first one to refuse stops the
//! chain. A qualified action listed in the controller's global except list
//! skips the chain entirely; a unit's own except list skips just that unit.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use hookwire_protocol::{JsonEnvelope, QualifiedAction, Request, Response};
use hookwire_session::Session;
use tracing::debug;

use crate::error::ActionFault;

/// `result` field of the envelope written when a unit refuses a request.
pub const REJECTION_RESULT: &str = "middleware check failed";

/// A single policy check.
///
/// A fresh unit is produced by the [`MiddlewareResolver`] for each dispatch,
/// so state recorded during [`exec`](Self::exec) (typically the error
/// message) never leaks into another request.
pub trait Middleware: Send + 'static {
    /// Return `false` to refuse the request.
    fn exec(
        &mut self,
        request: &Request,
        response: &Response,
        session: &mut Session,
    ) -> impl Future<Output = bool> + Send;

    /// Qualified actions (`Type::action`) this unit does not apply to.
    fn except(&self) -> &[String] {
        &[]
    }

    /// Why the last `exec` refused the request.
    fn error(&self) -> String {
        String::new()
    }
}

/// Object-safe version of Middleware trait.
trait MiddlewareDyn: Send {
    fn exec_dyn<'a>(
        &'a mut self,
        request: &'a Request,
        response: &'a Response,
        session: &'a mut Session,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

    fn except_dyn(&self) -> &[String];
    fn error_dyn(&self) -> String;
}

impl<T: Middleware> MiddlewareDyn for T {
    fn exec_dyn<'a>(
        &'a mut self,
        request: &'a Request,
        response: &'a Response,
        session: &'a mut Session,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(self.exec(request, response, session))
    }

    fn except_dyn(&self) -> &[String] {
        self.except()
    }

    fn error_dyn(&self) -> String {
        self.error()
    }
}

/// A resolved middleware together with the identifier it was resolved from.
pub struct MiddlewareUnit {
    name: String,
    inner: Box<dyn MiddlewareDyn>,
}

impl MiddlewareUnit {
    pub fn new<M: Middleware>(name: impl Into<String>, middleware: M) -> Self {
        Self {
            name: name.into(),
            inner: Box::new(middleware),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn excludes(&self, action: &QualifiedAction) -> bool {
        action.is_listed_in(self.inner.except_dyn())
    }
}

type Factory = Arc<dyn Fn() -> Box<dyn MiddlewareDyn> + Send + Sync>;

/// Maps middleware identifiers to factories. Handed to the dispatcher at
/// construction.
#[derive(Clone, Default)]
pub struct MiddlewareResolver {
    factories: HashMap<String, Factory>,
}

impl MiddlewareResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`, replacing any previous registration.
    pub fn register<M, F>(&mut self, name: impl Into<String>, factory: F)
    where
        M: Middleware,
        F: Fn() -> M + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || Box::new(factory()) as Box<dyn MiddlewareDyn>);
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn resolve(&self, name: &str) -> Option<MiddlewareUnit> {
        self.factories.get(name).map(|factory| MiddlewareUnit {
            name: name.to_string(),
            inner: factory(),
        })
    }

    /// Resolve `names` in order.
    pub fn resolve_all(&self, names: &[String]) -> Result<Vec<MiddlewareUnit>, ActionFault> {
        names
            .iter()
            .map(|name| {
                self.resolve(name)
                    .ok_or_else(|| ActionFault::UnresolvedMiddleware(name.clone()))
            })
            .collect()
    }
}

/// A unit refused the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlewareRejection {
    pub middleware: String,
    pub reason: String,
}

impl MiddlewareRejection {
    /// The reply written for this rejection. Transport status stays 200; the
    /// envelope carries the failure.
    pub fn envelope(&self) -> JsonEnvelope {
        JsonEnvelope::new(
            200,
            REJECTION_RESULT,
            format!("middleware {}: check failed, reason: {}", self.middleware, self.reason),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Every applicable unit accepted.
    Passed,
    /// The action is globally excluded; no unit ran.
    Bypassed,
    Rejected(MiddlewareRejection),
}

impl ChainOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Run `units` against `action`.
pub async fn run_chain(
    units: &mut [MiddlewareUnit],
    global_except: &[String],
    action: &QualifiedAction,
    request: &Request,
    response: &Response,
    session: &mut Session,
) -> ChainOutcome {
    if action.is_listed_in(global_except) {
        debug!("{action}: middleware chain bypassed");
        return ChainOutcome::Bypassed;
    }

    for unit in units.iter_mut() {
        if unit.excludes(action) {
            debug!("{action}: middleware {} skipped", unit.name);
            continue;
        }
        if !unit.inner.exec_dyn(request, response, session).await {
            return ChainOutcome::Rejected(MiddlewareRejection {
                middleware: unit.name.clone(),
                reason: unit.inner.error_dyn(),
            });
        }
    }

    ChainOutcome::Passed
}
