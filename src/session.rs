//! Server-side per-browser session state.
//!
//! Browsers only carry a random identifier in the `postbridge_session` cookie;
//! the state itself stays in process memory and is gone on restart.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, header};
use uuid::Uuid;

use crate::errors::SessionError;

pub const SESSION_COOKIE: &str = "postbridge_session";

/// Lifetime of a persistent session: 31 days.
pub const SESSION_MAX_AGE: Duration = Duration::from_secs(31 * 24 * 60 * 60);

/// Everything the bridge remembers about one browser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Graph API token; `None` also after a failed code exchange.
    pub access_token: Option<String>,
    /// Image URLs of the latest post, consumed at submit time.
    pub image_urls: Vec<String>,
    /// Last caption entered by the user.
    pub message: String,
    /// Anti-CSRF value of the pending OAuth redirect.
    pub oauth_state: Option<String>,
}

impl SessionState {
    /// Start a login attempt: forget the token and mint a fresh OAuth state.
    pub fn begin_login(&mut self) -> String {
        let state = Uuid::new_v4().simple().to_string();
        self.access_token = None;
        self.oauth_state = Some(state.clone());
        state
    }

    /// Check a callback's `state` against the pending one. The pending value
    /// is consumed either way.
    pub fn verify_oauth_state(&mut self, returned: Option<&str>) -> bool {
        match (self.oauth_state.take(), returned) {
            (Some(expected), Some(returned)) => expected == returned,
            _ => false,
        }
    }

    pub fn store_token(&mut self, token: Option<String>) {
        self.access_token = token;
    }

    pub fn store_image_urls(&mut self, urls: Vec<String>) {
        self.image_urls = urls;
    }

    pub fn remember_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }
}

struct Entry {
    state: SessionState,
    last_seen: Instant,
}

/// In-memory store keyed by session id.
pub struct SessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    max_age: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SESSION_MAX_AGE)
    }
}

impl SessionStore {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_age,
        }
    }

    /// Load the session named by the request cookies, or start a new one.
    /// Expired sessions are dropped on the way.
    pub fn load(&self, headers: &HeaderMap) -> Result<(String, SessionState), SessionError> {
        let mut entries = self.entries.lock().map_err(|_| SessionError::LockPoisoned)?;
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.last_seen) < self.max_age);

        if let Some(id) = session_id_from_headers(headers) {
            if let Some(entry) = entries.get(&id) {
                return Ok((id, entry.state.clone()));
            }
        }
        Ok((Uuid::new_v4().to_string(), SessionState::default()))
    }

    /// Persist the state for `id`, refreshing its expiry.
    pub fn save(&self, id: &str, state: SessionState) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().map_err(|_| SessionError::LockPoisoned)?;
        entries.insert(
            id.to_string(),
            Entry {
                state,
                last_seen: Instant::now(),
            },
        );
        Ok(())
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Extract our session id from the `Cookie` headers.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for a persistent, `SameSite=Lax` session cookie.
pub fn session_cookie(id: &str, max_age: Duration) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE,
        id,
        max_age.as_secs()
    )
}
