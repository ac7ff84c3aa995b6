use std::sync::Arc;

use anyhow::Context;
use axum::{
    Form, Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::bluesky::{BlueskyClient, Publisher};
use crate::config::BridgeConfig;
use crate::errors::{GraphError, PageError, SessionError};
use crate::facebook::{GraphApi, GraphClient, ImageResolution, resolve_latest_images};
use crate::fetch::{HttpImageFetcher, ImageFetcher};
use crate::richtext::build_styled_text;
use crate::session::{SessionState, SessionStore, session_cookie};

use super::templates::Pages;

/// Caption shown after a successful submit.
pub const SUCCESS_RESULT: &str = "success.";
/// Relative link from `/submit` back to the form.
pub const HOME_URL: &str = "..";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub graph: Arc<dyn GraphApi>,
    pub publisher: Arc<dyn Publisher>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub sessions: SessionStore,
    pub pages: Pages,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire the real Graph, Bluesky and HTTP clients.
    pub fn from_config(config: &BridgeConfig) -> anyhow::Result<Self> {
        Ok(Self {
            graph: Arc::new(GraphClient::new(&config.facebook).context("Graph API client")?),
            publisher: Arc::new(BlueskyClient::new(&config.bluesky)),
            fetcher: Arc::new(HttpImageFetcher::new()),
            sessions: SessionStore::default(),
            pages: Pages::new().context("Page templates")?,
        })
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitForm {
    pub message: String,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Upstream(String),
    Internal(String),
}

/// Message of a failed request, picked up by [`render_error_page`].
#[derive(Debug, Clone)]
struct ErrorMessage(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        warn!(status = status.as_u16(), %message, "request failed");
        let mut resp = (status, message.clone()).into_response();
        resp.extensions_mut().insert(ErrorMessage(message));
        resp
    }
}

/// Response middleware: replace the plain-text body of an [`ApiError`] with
/// the HTML error page. Other responses pass through untouched.
pub async fn render_error_page(State(state): State<SharedState>, mut resp: Response) -> Response {
    let Some(ErrorMessage(message)) = resp.extensions_mut().remove::<ErrorMessage>() else {
        return resp;
    };
    match state.pages.error_page(&message) {
        Ok(page) => (resp.status(), Html(page)).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to render error page");
            resp
        }
    }
}

impl From<PageError> for ApiError {
    fn from(err: PageError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Why `GET /` has to send the user through the OAuth dialog.
#[derive(Debug, Error)]
pub enum LoginRequired {
    #[error("no access token in session")]
    NoToken,

    #[error("token probe failed: {0}")]
    Probe(#[source] GraphError),

    #[error("media resolution failed: {0}")]
    Resolve(#[source] GraphError),
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(login))
        .route("/callback", get(callback))
        .route("/submit", post(submit))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Save the session and attach its cookie to the response.
fn persist(
    state: &AppState,
    session_id: &str,
    session: SessionState,
    body: impl IntoResponse,
) -> Result<Response, ApiError> {
    state.sessions.save(session_id, session)?;
    let cookie = session_cookie(session_id, state.sessions.max_age());
    let cookie = HeaderValue::from_str(&cookie).map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut resp = body.into_response();
    resp.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(resp)
}

/// Remember the resolved URLs; outcomes without images clear the list.
fn apply_resolution(session: &mut SessionState, resolution: &ImageResolution) {
    match resolution.urls() {
        Some(urls) => session.store_image_urls(urls.to_vec()),
        None => session.store_image_urls(Vec::new()),
    }
}

fn form_response(state: &AppState, session: &SessionState) -> Result<Html<String>, ApiError> {
    let page = state.pages.form_page(&session.image_urls, &session.message)?;
    Ok(Html(page))
}

/// Validate the cached token and refresh the session's image list.
async fn ensure_media(state: &AppState, session: &mut SessionState) -> Result<(), LoginRequired> {
    let token = session.access_token.clone().ok_or(LoginRequired::NoToken)?;
    state.graph.probe(&token).await.map_err(LoginRequired::Probe)?;
    let resolution = resolve_latest_images(state.graph.as_ref(), &token)
        .await
        .map_err(LoginRequired::Resolve)?;
    apply_resolution(session, &resolution);
    Ok(())
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

#[instrument(skip_all)]
async fn login(State(state): State<SharedState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let (session_id, mut session) = state.sessions.load(&headers)?;

    match ensure_media(&state, &mut session).await {
        Ok(()) => {
            let page = form_response(&state, &session)?;
            persist(&state, &session_id, session, page)
        }
        Err(reason) => {
            match &reason {
                LoginRequired::NoToken => info!("no token cached, starting facebook login"),
                LoginRequired::Probe(e) if e.is_invalid_token() => {
                    info!(error = %e, "cached token rejected, starting facebook login")
                }
                other => warn!(error = %other, "graph api unavailable, starting facebook login"),
            }
            let csrf_state = session.begin_login();
            let url = state.graph.authorize_url(&csrf_state);
            persist(&state, &session_id, session, Redirect::to(&url))
        }
    }
}

#[instrument(skip_all)]
async fn callback(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    let (session_id, mut session) = state.sessions.load(&headers)?;

    if !session.verify_oauth_state(params.state.as_deref()) {
        state.sessions.save(&session_id, session)?;
        return Err(ApiError::BadRequest(
            "Login state did not match; start again from the home page.".into(),
        ));
    }
    if let Some(error) = params.error {
        state.sessions.save(&session_id, session)?;
        let detail = params.error_description.unwrap_or(error);
        return Err(ApiError::BadRequest(format!("Facebook login failed: {}", detail)));
    }
    let code = params
        .code
        .ok_or_else(|| ApiError::BadRequest("Callback is missing the authorization code".into()))?;

    let token = state
        .graph
        .exchange_code(&code)
        .await
        .map_err(|e| ApiError::Upstream(format!("Token exchange failed: {}", e)))?;
    session.store_token(token.clone());
    state.sessions.save(&session_id, session.clone())?;

    let token =
        token.ok_or_else(|| ApiError::Upstream("Facebook did not return an access token".into()))?;
    info!("facebook login completed");

    let resolution = resolve_latest_images(state.graph.as_ref(), &token)
        .await
        .map_err(|e| ApiError::Upstream(format!("Could not read your latest post: {}", e)))?;
    apply_resolution(&mut session, &resolution);

    let page = form_response(&state, &session)?;
    persist(&state, &session_id, session, page)
}

#[instrument(skip_all)]
async fn submit(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Form(form): Form<SubmitForm>,
) -> Result<Response, ApiError> {
    let (session_id, mut session) = state.sessions.load(&headers)?;

    let mut images = Vec::with_capacity(session.image_urls.len());
    for url in &session.image_urls {
        let bytes = state
            .fetcher
            .fetch_bytes(url)
            .await
            .map_err(|e| ApiError::Internal(format!("Downloading an image failed: {}", e)))?;
        images.push(bytes);
    }

    session.remember_message(form.message.as_str());
    state.sessions.save(&session_id, session.clone())?;

    let styled = build_styled_text(&form.message);
    let post = state
        .publisher
        .post_images(&styled, &images)
        .await
        .map_err(|e| ApiError::Upstream(format!("Posting to Bluesky failed: {}", e)))?;
    info!(uri = %post.uri, images = images.len(), "submitted post");

    let page = Html(state.pages.result_page(SUCCESS_RESULT, HOME_URL)?);
    persist(&state, &session_id, session, page)
}
