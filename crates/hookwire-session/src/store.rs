//! Session persistence backends.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::config::DEFAULT_IDLE_TIMEOUT;
use crate::error::SessionError;

/// Key/value contents of one session.
pub type SessionData = HashMap<String, Value>;

/// Trait implemented by session backends.
pub trait SessionStore: Send + Sync + 'static {
    /// Load the data stored under `id`, or `None` if the id is unknown.
    fn load(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<SessionData>, SessionError>> + Send;

    /// Persist `data` under `id`, replacing what was there.
    fn save(
        &self,
        id: &str,
        data: SessionData,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Object-safe version of [`SessionStore`].
pub trait SessionStoreDyn: Send + Sync {
    fn load_dyn<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<SessionData>, SessionError>> + Send + 'a>>;

    fn save_dyn<'a>(
        &'a self,
        id: &'a str,
        data: SessionData,
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>>;
}

impl<T: SessionStore> SessionStoreDyn for T {
    fn load_dyn<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<SessionData>, SessionError>> + Send + 'a>> {
        Box::pin(self.load(id))
    }

    fn save_dyn<'a>(
        &'a self,
        id: &'a str,
        data: SessionData,
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>> {
        Box::pin(self.save(id, data))
    }
}

/// A store shared between the dispatcher and every session it opens.
pub type SharedSessionStore = Arc<dyn SessionStoreDyn>;

/// Saves between two sweeps of expired sessions.
const SWEEP_EVERY: usize = 64;

#[derive(Debug)]
struct StoredSession {
    data: SessionData,
    touched: Instant,
}

impl StoredSession {
    fn is_expired(&self, idle_timeout: Duration) -> bool {
        self.touched.elapsed() >= idle_timeout
    }
}

/// In-process session store.
///
/// Entries idle for longer than the configured timeout are treated as absent
/// on load and swept out every 64 saves.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: DashMap<String, StoredSession>,
    idle_timeout: Duration,
    saves: AtomicUsize,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
            saves: AtomicUsize::new(0),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Snapshot of a live stored session.
    pub fn get(&self, id: &str) -> Option<SessionData> {
        self.sessions
            .get(id)
            .filter(|entry| !entry.is_expired(self.idle_timeout))
            .map(|entry| entry.data.clone())
    }

    /// Stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| !entry.is_expired(self.idle_timeout));
        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            debug!("Purged {purged} expired sessions");
        }
        purged
    }
}

impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError> {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            if !entry.is_expired(self.idle_timeout) {
                entry.touched = Instant::now();
                return Ok(Some(entry.data.clone()));
            }
        }
        self.sessions
            .remove_if(id, |_, entry| entry.is_expired(self.idle_timeout));
        Ok(None)
    }

    async fn save(&self, id: &str, data: SessionData) -> Result<(), SessionError> {
        self.sessions.insert(
            id.to_string(),
            StoredSession {
                data,
                touched: Instant::now(),
            },
        );
        if (self.saves.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            self.purge_expired();
        }
        Ok(())
    }
}
