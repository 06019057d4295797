//! End-to-end integration tests: HTTP requests through the running server,
//! the controller lifecycle and the session cookie round trip.

use std::sync::Arc;

use hookwire_protocol::{Request, Response};
use hookwire_server::{
    ActionContext, ActionManifest, ActionOutput, Controller, Dispatcher, DispatcherConfig,
    Middleware, MiddlewareResolver,
};
use hookwire_session::Session;
use hookwire_transport::{TransportConfig, TransportServer};
use http::StatusCode;
use parking_lot::Mutex;
use serde_json::{Value, json};

const API_KEY: &str = "test-key";

/// Requires `x-api-key`.
struct ApiKey {
    error: String,
}

impl Middleware for ApiKey {
    async fn exec(&mut self, request: &Request, _response: &Response, _session: &mut Session) -> bool {
        match request.header("x-api-key") {
            Some(API_KEY) => true,
            Some(_) => {
                self.error = "wrong api key".into();
                false
            }
            None => {
                self.error = "missing api key".into();
                false
            }
        }
    }

    fn error(&self) -> String {
        self.error.clone()
    }
}

#[derive(Clone, Default)]
struct NotesController {
    /// Shared by every instance.
    notes: Arc<Mutex<Vec<String>>>,
    /// Reset after every dispatch.
    touched: bool,
}

impl Controller for NotesController {
    fn manifest() -> ActionManifest {
        ActionManifest::new("Notes")
            .actions(["list", "add", "touch", "jump", "crash"])
            .middleware("ApiKey")
            .except("list")
            .except("jump")
    }

    async fn call(&mut self, action: &str, cx: &mut ActionContext) -> ActionOutput {
        match action {
            "list" => {
                let notes = self.notes.lock().clone();
                cx.write_json(StatusCode::OK, json!(notes), "list");
                Ok(None)
            }
            "add" => {
                let note = String::from_utf8(cx.request().body().to_vec())?;
                self.notes.lock().push(note);
                cx.write_json(StatusCode::CREATED, "added", "add");
                Ok(None)
            }
            "touch" => {
                let was_touched = self.touched;
                self.touched = true;
                cx.write_json(StatusCode::OK, was_touched, "touch");
                Ok(None)
            }
            "jump" => Ok(Some("/Notes/list".into())),
            _ => anyhow::bail!("disk full"),
        }
    }
}

/// Start a test server on a random port.
async fn start_test_server() -> (TransportServer, String) {
    let mut resolver = MiddlewareResolver::new();
    resolver.register("ApiKey", || ApiKey { error: String::new() });

    let mut dispatcher = Dispatcher::with_memory_store(DispatcherConfig::default(), resolver);
    dispatcher.register(NotesController::default()).unwrap();

    let config = TransportConfig {
        port: 0, // OS-assigned
        ..TransportConfig::default()
    };
    let server = TransportServer::start(config, dispatcher).await.unwrap();
    let base = format!("http://127.0.0.1:{}", server.port());
    (server, base)
}

fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_controllers() {
    let (mut server, base) = start_test_server().await;

    let body: Value = reqwest::get(format!("{base}/health")).await.unwrap().json().await.unwrap();
    assert_eq!(body, json!({"status": "ok", "controllers": ["Notes"]}));

    server.stop().await;
}

#[tokio::test]
async fn public_action_issues_session_cookie() {
    let (mut server, base) = start_test_server().await;

    let response = reqwest::get(format!("{base}/Notes/list")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json;charset=utf-8"
    );
    let cookie = session_cookie(&response).expect("session cookie");
    assert!(cookie.starts_with("HOOKSESSID="));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"code": 200, "result": [], "msg": "list"}));

    // The same session is resumed, so no new cookie is issued.
    let client = reqwest::Client::new();
    let again = client
        .get(format!("{base}/Notes/list"))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert!(session_cookie(&again).is_none());

    server.stop().await;
}

#[tokio::test]
async fn middleware_rejection_body() {
    let (mut server, base) = start_test_server().await;

    let response = reqwest::Client::new()
        .post(format!("{base}/Notes/add"))
        .body("should not land")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.text().await.unwrap(),
        r#"{"code":200,"result":"middleware check failed","msg":"middleware ApiKey: check failed, reason: missing api key"}"#
    );

    let list: Value = reqwest::get(format!("{base}/Notes/list")).await.unwrap().json().await.unwrap();
    assert_eq!(list["result"], json!([]));

    server.stop().await;
}

#[tokio::test]
async fn authorized_action_runs() {
    let (mut server, base) = start_test_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/Notes/add"))
        .header("x-api-key", API_KEY)
        .body("buy milk")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let list: Value = client
        .get(format!("{base}/Notes/list"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["result"], json!(["buy milk"]));

    server.stop().await;
}

#[tokio::test]
async fn controller_state_resets_between_requests() {
    let (mut server, base) = start_test_server().await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let body: Value = client
            .get(format!("{base}/Notes/touch"))
            .header("x-api-key", API_KEY)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["result"], false);
    }

    server.stop().await;
}

#[tokio::test]
async fn forward_is_followed() {
    let (mut server, base) = start_test_server().await;

    let body: Value = reqwest::get(format!("{base}/Notes/jump")).await.unwrap().json().await.unwrap();
    assert_eq!(body["msg"], "list");

    server.stop().await;
}

#[tokio::test]
async fn error_statuses() {
    let (mut server, base) = start_test_server().await;
    let client = reqwest::Client::new();

    let missing_action = client
        .get(format!("{base}/Notes/nothing"))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(missing_action.status(), 404);

    let missing_controller = reqwest::get(format!("{base}/Ghost/index")).await.unwrap();
    assert_eq!(missing_controller.status(), 404);
    let body: Value = missing_controller.json().await.unwrap();
    assert_eq!(body["msg"], "controller not found: Ghost");

    let crashed = client
        .get(format!("{base}/Notes/crash"))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(crashed.status(), 500);

    server.stop().await;
}
