//! Facebook Graph API: OAuth login and latest-post media resolution.
//!
//! `GraphApi` is the seam the web layer talks to. `GraphClient` is the real
//! implementation over `reqwest`; tests substitute their own.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::FacebookConfig;
use crate::errors::{ConfigError, GraphError};

pub const GRAPH_BASE_URL: &str = "https://graph.facebook.com";
pub const DIALOG_BASE_URL: &str = "https://www.facebook.com";
pub const OAUTH_SCOPE: &str = "public_profile,openid";

const LIST_FIELDS: &str = "id,created_time";
const DETAIL_FIELDS: &str = "message,created_time,attachments";

/// Entry of the `me/posts` listing.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PostSummary {
    pub id: String,
    #[serde(default)]
    pub created_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostList {
    #[serde(default)]
    data: Vec<PostSummary>,
}

/// Detail fields of a single post.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostDetail {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub attachments: Option<AttachmentList>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentList {
    #[serde(default)]
    pub data: Vec<Attachment>,
}

/// A post attachment. Albums carry their photos as `subattachments`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub media: Option<Media>,
    #[serde(default)]
    pub subattachments: Option<AttachmentList>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub image: Option<Image>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub src: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    error: Option<GraphErrorBody>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphErrorBody,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// Outcome of resolving the images of the latest post.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageResolution {
    /// The account has no posts at all.
    NoPosts,
    /// The latest post exists but carries no attachments.
    NoAttachments { post_id: String },
    /// Image URLs found on the latest post, in attachment order. May be empty.
    Images { post_id: String, urls: Vec<String> },
}

impl ImageResolution {
    /// URLs to remember in the session, if this outcome produced any list.
    pub fn urls(&self) -> Option<&[String]> {
        match self {
            ImageResolution::Images { urls, .. } => Some(urls),
            _ => None,
        }
    }
}

/// Operations the bridge needs from the Graph API.
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// URL of the OAuth dialog carrying the given anti-CSRF `state`.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange an authorization code. `Ok(None)` when the response carries
    /// no token; the caller stores whatever comes back.
    async fn exchange_code(&self, code: &str) -> Result<Option<String>, GraphError>;

    /// Cheap call that fails when the token is unusable.
    async fn probe(&self, access_token: &str) -> Result<(), GraphError>;

    async fn list_posts(&self, access_token: &str) -> Result<Vec<PostSummary>, GraphError>;

    async fn post_detail(&self, access_token: &str, post_id: &str) -> Result<PostDetail, GraphError>;
}

/// Resolve the image URLs of the account's latest post.
///
/// The first entry of `me/posts` is taken as the latest; no local sort is
/// applied. Without posts no detail call is made.
pub async fn resolve_latest_images(
    api: &dyn GraphApi,
    access_token: &str,
) -> Result<ImageResolution, GraphError> {
    let posts = api.list_posts(access_token).await?;
    let Some(latest) = posts.into_iter().next() else {
        debug!("no posts on account");
        return Ok(ImageResolution::NoPosts);
    };

    let detail = api.post_detail(access_token, &latest.id).await?;
    let resolution = match extract_image_urls(&detail) {
        Some(urls) => ImageResolution::Images {
            post_id: latest.id,
            urls,
        },
        None => ImageResolution::NoAttachments { post_id: latest.id },
    };
    debug!(?resolution, "resolved latest post media");
    Ok(resolution)
}

/// Pull image URLs out of a post's attachments.
///
/// Returns `None` when the post has no `attachments` at all. Otherwise only the
/// first attachment is inspected: its subattachments that carry an image are
/// collected, the rest skipped. A single-photo post has no subattachments and
/// yields its own image instead.
pub fn extract_image_urls(detail: &PostDetail) -> Option<Vec<String>> {
    let attachments = detail.attachments.as_ref()?;
    let Some(first) = attachments.data.first() else {
        return Some(Vec::new());
    };

    let urls = match &first.subattachments {
        Some(subattachments) => subattachments
            .data
            .iter()
            .filter_map(image_src)
            .collect(),
        None => image_src(first).into_iter().collect(),
    };
    Some(urls)
}

fn image_src(attachment: &Attachment) -> Option<String> {
    attachment
        .media
        .as_ref()?
        .image
        .as_ref()
        .map(|image| image.src.clone())
}

/// Map a failed Graph response to an error, recognising token problems.
fn classify_failure(status: u16, body: &str) -> GraphError {
    let envelope: Option<GraphErrorEnvelope> = serde_json::from_str(body).ok();
    let oauth_error = envelope
        .as_ref()
        .is_some_and(|env| env.error.kind.as_deref() == Some("OAuthException"));

    if status == 401 || status == 403 || oauth_error {
        let message = envelope
            .map(|env| env.error.message)
            .unwrap_or_else(|| body.to_string());
        GraphError::InvalidToken { status, message }
    } else {
        GraphError::Status {
            status,
            body: body.to_string(),
        }
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, GraphError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify_failure(status.as_u16(), &body))
}

/// `reqwest`-backed Graph API client.
pub struct GraphClient {
    http: reqwest::Client,
    graph_url: String,
    dialog_url: Url,
    app_id: String,
    app_secret: String,
    redirect_uri: String,
}

impl GraphClient {
    pub fn new(config: &FacebookConfig) -> Result<Self, ConfigError> {
        Self::with_base_urls(config, GRAPH_BASE_URL, DIALOG_BASE_URL)
    }

    /// Point the client at other hosts (used against mock servers).
    pub fn with_base_urls(
        config: &FacebookConfig,
        graph_base: &str,
        dialog_base: &str,
    ) -> Result<Self, ConfigError> {
        let version = &config.api_version;
        let dialog = format!("{}/{}/dialog/oauth", dialog_base.trim_end_matches('/'), version);
        let dialog_url = Url::parse(&dialog).map_err(|e| ConfigError::Invalid {
            name: "FACEBOOK_DIALOG_URL",
            message: e.to_string(),
        })?;

        Ok(Self {
            http: reqwest::Client::new(),
            graph_url: format!("{}/{}", graph_base.trim_end_matches('/'), version),
            dialog_url,
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    async fn get_posts(
        &self,
        access_token: &str,
        limit: Option<&str>,
    ) -> Result<Vec<PostSummary>, GraphError> {
        let mut query = vec![("access_token", access_token), ("fields", LIST_FIELDS)];
        if let Some(limit) = limit {
            query.push(("limit", limit));
        }
        let resp = self
            .http
            .get(format!("{}/me/posts", self.graph_url))
            .query(&query)
            .send()
            .await
            .map_err(GraphError::Network)?;
        let list: PostList = check_status(resp)
            .await?
            .json()
            .await
            .map_err(GraphError::Decode)?;
        Ok(list.data)
    }
}

#[async_trait]
impl GraphApi for GraphClient {
    fn authorize_url(&self, state: &str) -> String {
        let mut url = self.dialog_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.app_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", state)
            .append_pair("scope", OAUTH_SCOPE);
        url.into()
    }

    async fn exchange_code(&self, code: &str) -> Result<Option<String>, GraphError> {
        let resp = self
            .http
            .get(format!("{}/oauth/access_token", self.graph_url))
            .query(&[
                ("client_id", self.app_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_secret", self.app_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await
            .map_err(GraphError::Network)?;

        let status = resp.status();
        let token: TokenResponse = resp.json().await.map_err(GraphError::Decode)?;
        if !status.is_success() {
            let message = token.error.map(|e| e.message).unwrap_or_default();
            warn!(status = status.as_u16(), %message, "token exchange rejected");
        }
        Ok(token.access_token)
    }

    async fn probe(&self, access_token: &str) -> Result<(), GraphError> {
        self.get_posts(access_token, Some("1")).await.map(|_| ())
    }

    async fn list_posts(&self, access_token: &str) -> Result<Vec<PostSummary>, GraphError> {
        self.get_posts(access_token, None).await
    }

    async fn post_detail(&self, access_token: &str, post_id: &str) -> Result<PostDetail, GraphError> {
        let resp = self
            .http
            .get(format!("{}/{}", self.graph_url, post_id))
            .query(&[("access_token", access_token), ("fields", DETAIL_FIELDS)])
            .send()
            .await
            .map_err(GraphError::Network)?;
        check_status(resp)
            .await?
            .json()
            .await
            .map_err(GraphError::Decode)
    }
}
