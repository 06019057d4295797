//! The per-dispatch session handle.

use std::fmt;
use std::sync::Arc;

use hookwire_protocol::{Request, Response};
use http::header::{self, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::store::{SessionData, SharedSessionStore};

/// Lifecycle of a [`Session`]: `Idle → Started → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Started,
    Closed,
}

/// Session bound to one request/response pair.
///
/// Created idle; [`start`](Self::start) resolves the id from the request
/// cookie (or issues a new one through `Set-Cookie`) and loads the stored
/// data. [`write_close`](Self::write_close) persists modified data and closes
/// the handle for good.
pub struct Session {
    store: SharedSessionStore,
    config: Arc<SessionConfig>,
    cookie_id: Option<String>,
    response: Response,
    id: Option<String>,
    data: SessionData,
    state: SessionState,
    dirty: bool,
}

impl Session {
    pub fn new(
        store: SharedSessionStore,
        config: Arc<SessionConfig>,
        request: &Request,
        response: Response,
    ) -> Self {
        let cookie_id = request
            .cookie(&config.cookie_name)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        Self {
            store,
            config,
            cookie_id,
            response,
            id: None,
            data: SessionData::new(),
            state: SessionState::Idle,
            dirty: false,
        }
    }

    /// Start the session. Starting an already started session is a no-op.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Started => return Ok(()),
            SessionState::Closed => return Err(SessionError::Closed),
            SessionState::Idle => {}
        }

        let known = match self.cookie_id.take() {
            Some(id) => self.store.load_dyn(&id).await?.map(|data| (id, data)),
            None => None,
        };

        match known {
            Some((id, data)) => {
                debug!("Session resumed: {id}");
                self.id = Some(id);
                self.data = data;
            }
            None => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                self.issue_cookie(&id)?;
                debug!("Session issued: {id}");
                self.id = Some(id);
                self.data = SessionData::new();
                // A fresh id must reach the store even if nothing is set.
                self.dirty = true;
            }
        }

        self.state = SessionState::Started;
        Ok(())
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state == SessionState::Started
    }

    /// Value under `key`. Always `None` before the session is started.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if self.state != SessionState::Started {
            return None;
        }
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), SessionError> {
        self.ensure_started()?;
        self.data.insert(key.into(), value.into());
        self.dirty = true;
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Result<Option<Value>, SessionError> {
        self.ensure_started()?;
        let removed = self.data.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        Ok(removed)
    }

    /// Persist pending changes and close the handle. Idempotent.
    pub async fn write_close(&mut self) -> Result<(), SessionError> {
        let was_started = self.state == SessionState::Started;
        self.state = SessionState::Closed;
        if !was_started || !self.dirty {
            return Ok(());
        }
        self.dirty = false;
        let data = std::mem::take(&mut self.data);
        match self.id.as_deref() {
            Some(id) => self.store.save_dyn(id, data).await,
            None => Ok(()),
        }
    }

    fn ensure_started(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Started => Ok(()),
            SessionState::Idle => Err(SessionError::NotStarted),
            SessionState::Closed => Err(SessionError::Closed),
        }
    }

    fn issue_cookie(&self, id: &str) -> Result<(), SessionError> {
        let cookie = format!(
            "{}={}; Path={}; HttpOnly",
            self.config.cookie_name, id, self.config.cookie_path
        );
        let value = HeaderValue::from_str(&cookie).map_err(|e| SessionError::Cookie(e.to_string()))?;
        self.response.append_header(header::SET_COOKIE, value);
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("dirty", &self.dirty)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}
