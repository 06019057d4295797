//! Demo application served by the binary: a public index controller and an
//! account controller guarded by token authentication.

use std::sync::Arc;

use hookwire_protocol::{Request, Response};
use hookwire_server::{
    ActionContext, ActionManifest, ActionOutput, Controller, Dispatcher, DispatcherConfig,
    Middleware, MiddlewareResolver, RegistryError,
};
use hookwire_session::Session;
use http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

/// Identifier the auth middleware is registered under.
pub const AUTH_MIDDLEWARE: &str = "TokenAuth";

/// Session flag set by a successful login.
const AUTHENTICATED_KEY: &str = "authenticated";

// ─────────────────────────────────────────────────────────────────────────────
// Middleware
// ─────────────────────────────────────────────────────────────────────────────

/// Accepts a logged-in session or an `Authorization: Bearer <token>` header.
pub struct TokenAuth {
    token: Arc<str>,
    error: String,
}

impl TokenAuth {
    pub fn new(token: Arc<str>) -> Self {
        Self {
            token,
            error: String::new(),
        }
    }
}

impl Middleware for TokenAuth {
    async fn exec(&mut self, request: &Request, _response: &Response, session: &mut Session) -> bool {
        if session.get(AUTHENTICATED_KEY).and_then(Value::as_bool) == Some(true) {
            return true;
        }

        match request
            .header("authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
        {
            Some(token) if token == &*self.token => true,
            Some(_) => {
                self.error = "invalid token".into();
                false
            }
            None => {
                self.error = "missing credentials".into();
                false
            }
        }
    }

    fn error(&self) -> String {
        self.error.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Controllers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct IndexController;

impl Controller for IndexController {
    fn manifest() -> ActionManifest {
        ActionManifest::new("Index").actions(["index", "echo", "legacy"])
    }

    async fn call(&mut self, action: &str, cx: &mut ActionContext) -> ActionOutput {
        match action {
            "index" => {
                cx.write_json(StatusCode::OK, json!({"name": "hookwire"}), "welcome");
                Ok(None)
            }
            "echo" => {
                let request = cx.request();
                let echoed = json!({
                    "method": request.method().as_str(),
                    "path": request.path(),
                    "query": request.uri().query(),
                    "body": String::from_utf8_lossy(request.body()),
                });
                cx.write_json(StatusCode::OK, echoed, "echo");
                Ok(None)
            }
            "legacy" => Ok(Some("/Index/index".into())),
            other => anyhow::bail!("unhandled action {other}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    token: String,
}

#[derive(Debug, Clone)]
pub struct AccountController {
    /// Shared across dispatches, never reset.
    token: Arc<str>,
}

impl AccountController {
    pub fn new(token: Arc<str>) -> Self {
        Self { token }
    }
}

impl Controller for AccountController {
    fn manifest() -> ActionManifest {
        ActionManifest::new("Account")
            .actions(["login", "logout", "profile"])
            .middleware(AUTH_MIDDLEWARE)
            .except("login")
    }

    async fn call(&mut self, action: &str, cx: &mut ActionContext) -> ActionOutput {
        match action {
            "login" => {
                let body: LoginBody = cx.json()?;
                if body.token != *self.token {
                    cx.write_json(StatusCode::UNAUTHORIZED, "denied", "invalid token");
                    return Ok(None);
                }
                cx.session().set(AUTHENTICATED_KEY, true)?;
                cx.write_json(StatusCode::OK, "ok", "logged in");
                Ok(None)
            }
            "logout" => {
                cx.session().remove(AUTHENTICATED_KEY)?;
                cx.write_json(StatusCode::OK, "ok", "logged out");
                Ok(None)
            }
            "profile" => {
                let session = cx.session();
                let profile = json!({
                    "session": session.id(),
                    "authenticated": session.get(AUTHENTICATED_KEY).cloned().unwrap_or(Value::Bool(false)),
                });
                cx.write_json(StatusCode::OK, profile, "profile");
                Ok(None)
            }
            other => anyhow::bail!("unhandled action {other}"),
        }
    }
}

/// Dispatcher with the demo controllers registered.
pub fn build_dispatcher(config: DispatcherConfig, token: &str) -> Result<Dispatcher, RegistryError> {
    let token: Arc<str> = Arc::from(token);

    let mut resolver = MiddlewareResolver::new();
    let auth_token = token.clone();
    resolver.register(AUTH_MIDDLEWARE, move || TokenAuth::new(auth_token.clone()));

    let mut dispatcher = Dispatcher::with_memory_store(config, resolver);
    dispatcher.register(IndexController)?;
    dispatcher.register(AccountController::new(token))?;

    info!("Demo controllers registered: {:?}", dispatcher.controllers());
    Ok(dispatcher)
}
