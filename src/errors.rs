//! Typed error hierarchy for the bridge.
//!
//! One enum per outbound concern:
//! - `ConfigError` — missing or malformed startup settings
//! - `GraphError` — Facebook Graph API calls (probe, media resolution, token exchange)
//! - `FetchError` — image downloads
//! - `PublishError` — Bluesky session, blob upload and record creation
//! - `PageError` — embedded HTML templates
//! - `SessionError` — the in-memory session store

use thiserror::Error;

/// Errors raised while assembling the runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting {name}")]
    Missing { name: &'static str },

    #[error("Invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Errors from the Facebook Graph API.
///
/// The login probe collapses all of these into "redirect to OAuth", but the
/// variants stay distinct so each branch can be logged and tested on its own.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Graph API request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Access token rejected (HTTP {status}): {message}")]
    InvalidToken { status: u16, message: String },

    #[error("Graph API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode Graph API response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl GraphError {
    /// Whether this error means the cached token should be thrown away.
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, GraphError::InvalidToken { .. })
    }
}

/// Errors from downloading an image attachment.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to download {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Errors from publishing to Bluesky.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Bluesky credentials are not configured")]
    MissingCredentials,

    #[error("Bluesky request to {endpoint} failed: {source}")]
    Network {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Bluesky login failed (HTTP {status}): {body}")]
    Login { status: u16, body: String },

    #[error("Bluesky session rejected (HTTP {status}): {body}")]
    Auth { status: u16, body: String },

    #[error("Bluesky {endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("Failed to decode Bluesky {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors from the embedded HTML page templates.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("Failed to register page templates: {0}")]
    Register(#[from] handlebars::TemplateError),

    #[error("Failed to render page: {0}")]
    Render(#[from] handlebars::RenderError),
}

/// Errors from the server-side session store.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session store lock poisoned")]
    LockPoisoned,
}
