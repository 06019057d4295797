//! ControllerInstance: one controller driven through the dispatch lifecycle.
//!
//! ```text
//! INIT → CSRF_SETUP → MIDDLEWARE → {ACTION | NOT_FOUND | MIDDLEWARE_REJECTED}
//!      → AFTER_ACTION → CLEANUP → DONE
//! ```
//!
//! Faults (errors and panics) from every stage after INIT are routed through
//! [`Controller::on_exception`]. The last fault the hook re-raises (or a panic
//! inside the hook itself) is what the dispatch returns; AFTER_ACTION and
//! CLEANUP still run before it does.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use hookwire_protocol::{Request, Response};
use hookwire_session::ensure_csrf_token;
use tracing::{debug, error, trace, warn};

use crate::controller::{ActionContext, Controller, SessionSource};
use crate::error::ActionFault;
use crate::middleware::{ChainOutcome, MiddlewareResolver, run_chain};
use crate::registry::ControllerType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    Init,
    CsrfSetup,
    Middleware,
    Action,
    NotFound,
    MiddlewareRejected,
    AfterAction,
    Cleanup,
    Done,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::CsrfSetup => "csrf setup",
            Self::Middleware => "middleware",
            Self::Action => "action",
            Self::NotFound => "not found",
            Self::MiddlewareRejected => "middleware rejected",
            Self::AfterAction => "after action",
            Self::Cleanup => "cleanup",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Dispatcher-owned collaborators a dispatch needs.
pub(crate) struct DispatchEnv<'a> {
    pub(crate) csrf_key: &'a str,
    pub(crate) resolver: &'a MiddlewareResolver,
    pub(crate) sessions: &'a SessionSource,
}

/// A controller plus the handles bound to it for the current dispatch.
pub struct ControllerInstance<C: Controller> {
    controller: C,
    ty: Arc<ControllerType<C>>,
    context: Option<ActionContext>,
    stage: LifecycleStage,
}

impl<C: Controller> ControllerInstance<C> {
    /// Fresh instance cloned from the type's default snapshot.
    pub fn new(ty: Arc<ControllerType<C>>) -> Self {
        Self {
            controller: ty.defaults().clone(),
            ty,
            context: None,
            stage: LifecycleStage::Done,
        }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_type(&self) -> &ControllerType<C> {
        &self.ty
    }

    /// Last stage entered. `Done` between dispatches.
    pub fn stage(&self) -> LifecycleStage {
        self.stage
    }

    /// Whether request/response/session handles are currently bound.
    pub fn is_bound(&self) -> bool {
        self.context.is_some()
    }

    /// True when nothing distinguishes this instance from a fresh one.
    pub fn is_pristine(&self) -> bool
    where
        C: PartialEq,
    {
        self.context.is_none() && self.stage == LifecycleStage::Done && self.controller == *self.ty.defaults()
    }

    /// Drive one dispatch. Returns the action's forward path, if any.
    pub(crate) async fn hook(
        &mut self,
        action: &str,
        request: Request,
        response: Response,
        env: &DispatchEnv<'_>,
    ) -> Result<Option<String>, ActionFault> {
        let Self {
            controller,
            ty,
            context,
            stage,
        } = self;

        // INIT
        enter(stage, LifecycleStage::Init, ty.name(), action);
        if context.is_some() {
            warn!("{}: instance still bound from a previous dispatch, rebinding", ty.name());
        }
        let mut escalated: Option<ActionFault> = None;
        let mut forward: Option<String> = None;

        {
            let cx = context.insert(ActionContext::new(action, request, response, env.sessions.clone()));

            // CSRF_SETUP
            enter(stage, LifecycleStage::CsrfSetup, ty.name(), action);
            let csrf = guard(*stage, async {
                ensure_csrf_token(cx.session(), env.csrf_key)
                    .await
                    .map(drop)
                    .map_err(ActionFault::Csrf)
            })
            .await;
            let mut admitted = match csrf {
                Ok(()) => true,
                Err(fault) => {
                    escalate(controller, cx, fault, &mut escalated);
                    false
                }
            };

            // MIDDLEWARE
            if admitted {
                enter(stage, LifecycleStage::Middleware, ty.name(), action);
                match guard(*stage, run_middleware(ty, cx, env.resolver)).await {
                    Ok(ChainOutcome::Rejected(rejection)) => {
                        enter(stage, LifecycleStage::MiddlewareRejected, ty.name(), action);
                        warn!(
                            "{}::{action} rejected by middleware {}: {}",
                            ty.name(),
                            rejection.middleware,
                            rejection.reason
                        );
                        cx.response().write_json(&rejection.envelope());
                        cx.response().end();
                        admitted = false;
                    }
                    Ok(_) => {}
                    Err(fault) => {
                        escalate(controller, cx, fault, &mut escalated);
                        admitted = false;
                    }
                }
            }

            // ACTION | NOT_FOUND
            if admitted {
                if ty.allows(action) {
                    enter(stage, LifecycleStage::Action, ty.name(), action);
                    let outcome = guard(*stage, async {
                        controller.call(action, cx).await.map_err(|error| ActionFault::Action {
                            action: action.to_string(),
                            error,
                        })
                    })
                    .await;
                    match outcome {
                        Ok(path) => forward = path,
                        Err(fault) => escalate(controller, cx, fault, &mut escalated),
                    }
                } else {
                    enter(stage, LifecycleStage::NotFound, ty.name(), action);
                    debug!("{}: no action `{action}`", ty.name());
                    let outcome = guard(*stage, async {
                        controller
                            .action_not_found(action, cx)
                            .await
                            .map_err(|error| ActionFault::NotFound {
                                action: action.to_string(),
                                error,
                            })
                    })
                    .await;
                    if let Err(fault) = outcome {
                        escalate(controller, cx, fault, &mut escalated);
                    }
                }
            }

            // AFTER_ACTION
            enter(stage, LifecycleStage::AfterAction, ty.name(), action);
            let outcome = guard(*stage, async {
                controller
                    .after_action(action, cx)
                    .await
                    .map_err(|error| ActionFault::AfterAction {
                        action: action.to_string(),
                        error,
                    })
            })
            .await;
            if let Err(fault) = outcome {
                escalate(controller, cx, fault, &mut escalated);
            }

            // CLEANUP: close the session while the response is still bound so
            // the exception hook can still answer a close failure.
            enter(stage, LifecycleStage::Cleanup, ty.name(), action);
            if let Some(mut session) = cx.take_session() {
                if let Err(err) = session.write_close().await {
                    escalate(controller, cx, ActionFault::Cleanup(err), &mut escalated);
                }
            }
        }

        *context = None;
        controller.clone_from(ty.defaults());
        enter(stage, LifecycleStage::Done, ty.name(), action);

        match escalated {
            Some(fault) => Err(fault),
            None => Ok(forward),
        }
    }
}

fn enter(stage: &mut LifecycleStage, next: LifecycleStage, type_name: &str, action: &str) {
    trace!("{type_name}::{action}: {} -> {}", stage, next);
    *stage = next;
}

async fn run_middleware<C: Controller>(
    ty: &ControllerType<C>,
    cx: &mut ActionContext,
    resolver: &MiddlewareResolver,
) -> Result<ChainOutcome, ActionFault> {
    if ty.middleware().is_empty() {
        return Ok(ChainOutcome::Passed);
    }
    let qualified = ty.qualify(cx.action_name());
    let mut units = resolver.resolve_all(ty.middleware())?;
    let (request, response, session) = cx.parts();
    Ok(run_chain(&mut units, ty.middleware_except(), &qualified, request, response, session).await)
}

/// Offer `fault` to the controller's exception hook. A re-raised fault, or a
/// panic inside the hook, replaces whatever an earlier stage escalated.
fn escalate<C: Controller>(
    controller: &mut C,
    cx: &mut ActionContext,
    fault: ActionFault,
    escalated: &mut Option<ActionFault>,
) {
    let stage = fault.stage();
    let raised = match panic::catch_unwind(AssertUnwindSafe(|| controller.on_exception(fault, cx))) {
        Ok(Ok(())) => {
            debug!("{}: fault during {stage} handled by controller", cx.action_name());
            return;
        }
        Ok(Err(fault)) => fault,
        Err(payload) => ActionFault::Panicked {
            stage,
            message: format!("exception hook: {}", panic_message(payload.as_ref())),
        },
    };
    error!("{}: {raised}", cx.action_name());
    if let Some(replaced) = escalated.replace(raised) {
        warn!("{}: superseded by a later fault: {replaced}", cx.action_name());
    }
}

/// Await `fut`, turning a panic into [`ActionFault::Panicked`].
async fn guard<T, F>(stage: LifecycleStage, fut: F) -> Result<T, ActionFault>
where
    F: Future<Output = Result<T, ActionFault>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ActionFault::Panicked {
            stage,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
