//! Bluesky publishing over the AT Protocol XRPC endpoints.
//!
//! A post is published in three steps:
//!
//! 1. `com.atproto.server.createSession` (once, then cached in-process)
//! 2. `com.atproto.repo.uploadBlob` for every image
//! 3. `com.atproto.repo.createRecord` with an `app.bsky.feed.post` record
//!    embedding the uploaded blobs and carrying hashtag facets

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::BlueskyConfig;
use crate::errors::PublishError;
use crate::richtext::StyledText;

const CREATE_SESSION: &str = "com.atproto.server.createSession";
const UPLOAD_BLOB: &str = "com.atproto.repo.uploadBlob";
const CREATE_RECORD: &str = "com.atproto.repo.createRecord";

const POST_COLLECTION: &str = "app.bsky.feed.post";
const IMAGES_EMBED: &str = "app.bsky.embed.images";
const TAG_FEATURE: &str = "app.bsky.richtext.facet#tag";

/// Publishes one post with a caption and any number of images.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn post_images(&self, text: &StyledText, images: &[Vec<u8>]) -> Result<PostRef, PublishError>;
}

/// Reference to a created record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostRef {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BskySession {
    pub access_jwt: String,
    pub did: String,
    #[serde(default)]
    pub handle: String,
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct UploadBlobResponse {
    blob: serde_json::Value,
}

#[derive(Deserialize)]
struct XrpcErrorBody {
    #[serde(default)]
    error: String,
}

#[derive(Debug, Serialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Serialize)]
pub struct FacetFeature {
    #[serde(rename = "$type")]
    pub kind: &'static str,
    pub tag: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostRecord {
    #[serde(rename = "$type")]
    kind: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    facets: Vec<Facet>,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    embed: Option<ImagesEmbed>,
}

#[derive(Serialize)]
struct ImagesEmbed {
    #[serde(rename = "$type")]
    kind: &'static str,
    images: Vec<EmbeddedImage>,
}

#[derive(Serialize)]
struct EmbeddedImage {
    alt: String,
    image: serde_json::Value,
}

#[derive(Serialize)]
struct CreateRecordRequest<'a> {
    repo: &'a str,
    collection: &'static str,
    record: PostRecord,
}

/// Hashtag facets for every tag segment of `text`.
pub fn facets_for(text: &StyledText) -> Vec<Facet> {
    text.tag_spans()
        .into_iter()
        .map(|span| Facet {
            index: ByteSlice {
                byte_start: span.byte_start,
                byte_end: span.byte_end,
            },
            features: vec![FacetFeature {
                kind: TAG_FEATURE,
                tag: span.tag,
            }],
        })
        .collect()
}

/// Guess an image MIME type from its leading bytes.
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}

/// Classify a failed XRPC response. Expired or rejected sessions become `Auth`.
fn xrpc_failure(endpoint: &'static str, status: u16, body: String) -> PublishError {
    let error = serde_json::from_str::<XrpcErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or_default();
    if status == 401 || error == "ExpiredToken" || error == "InvalidToken" {
        PublishError::Auth { status, body }
    } else {
        PublishError::Status {
            endpoint,
            status,
            body,
        }
    }
}

async fn check_status(
    endpoint: &'static str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, PublishError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(xrpc_failure(endpoint, status.as_u16(), body))
}

/// `reqwest`-backed Bluesky client holding a cached session.
pub struct BlueskyClient {
    http: reqwest::Client,
    service: String,
    identifier: String,
    password: String,
    session: Mutex<Option<BskySession>>,
}

impl BlueskyClient {
    pub fn new(config: &BlueskyConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            service: config.service.trim_end_matches('/').to_string(),
            identifier: config.identifier.clone(),
            password: config.app_password.clone(),
            session: Mutex::new(None),
        }
    }

    fn xrpc_url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service, method)
    }

    /// Return the cached session, logging in first if there is none.
    pub async fn load_session(&self) -> Result<BskySession, PublishError> {
        let mut cached = self.session.lock().await;
        if let Some(session) = cached.as_ref() {
            return Ok(session.clone());
        }
        let session = self.create_session().await?;
        *cached = Some(session.clone());
        Ok(session)
    }

    async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    async fn invalidate_session(&self) {
        self.session.lock().await.take();
    }

    async fn create_session(&self) -> Result<BskySession, PublishError> {
        if self.identifier.is_empty() || self.password.is_empty() {
            return Err(PublishError::MissingCredentials);
        }
        let resp = self
            .http
            .post(self.xrpc_url(CREATE_SESSION))
            .json(&CreateSessionRequest {
                identifier: &self.identifier,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|source| PublishError::Network {
                endpoint: CREATE_SESSION,
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PublishError::Login {
                status: status.as_u16(),
                body,
            });
        }
        let session: BskySession = resp.json().await.map_err(|source| PublishError::Decode {
            endpoint: CREATE_SESSION,
            source,
        })?;
        info!(handle = %session.handle, did = %session.did, "bluesky session created");
        Ok(session)
    }

    async fn upload_blob(
        &self,
        session: &BskySession,
        bytes: &[u8],
    ) -> Result<serde_json::Value, PublishError> {
        let mime = sniff_image_mime(bytes);
        let resp = self
            .http
            .post(self.xrpc_url(UPLOAD_BLOB))
            .bearer_auth(&session.access_jwt)
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|source| PublishError::Network {
                endpoint: UPLOAD_BLOB,
                source,
            })?;
        let uploaded: UploadBlobResponse = check_status(UPLOAD_BLOB, resp)
            .await?
            .json()
            .await
            .map_err(|source| PublishError::Decode {
                endpoint: UPLOAD_BLOB,
                source,
            })?;
        debug!(mime, len = bytes.len(), "uploaded blob");
        Ok(uploaded.blob)
    }

    async fn create_post(
        &self,
        session: &BskySession,
        text: &StyledText,
        blobs: Vec<serde_json::Value>,
    ) -> Result<PostRef, PublishError> {
        let embed = (!blobs.is_empty()).then(|| ImagesEmbed {
            kind: IMAGES_EMBED,
            images: blobs
                .into_iter()
                .map(|image| EmbeddedImage {
                    alt: String::new(),
                    image,
                })
                .collect(),
        });
        let request = CreateRecordRequest {
            repo: &session.did,
            collection: POST_COLLECTION,
            record: PostRecord {
                kind: POST_COLLECTION,
                text: text.text(),
                facets: facets_for(text),
                created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                embed,
            },
        };

        let resp = self
            .http
            .post(self.xrpc_url(CREATE_RECORD))
            .bearer_auth(&session.access_jwt)
            .json(&request)
            .send()
            .await
            .map_err(|source| PublishError::Network {
                endpoint: CREATE_RECORD,
                source,
            })?;
        check_status(CREATE_RECORD, resp)
            .await?
            .json()
            .await
            .map_err(|source| PublishError::Decode {
                endpoint: CREATE_RECORD,
                source,
            })
    }

    async fn publish_once(&self, text: &StyledText, images: &[Vec<u8>]) -> Result<PostRef, PublishError> {
        let session = self.load_session().await?;
        let mut blobs = Vec::with_capacity(images.len());
        for image in images {
            blobs.push(self.upload_blob(&session, image).await?);
        }
        self.create_post(&session, text, blobs).await
    }
}

#[async_trait]
impl Publisher for BlueskyClient {
    async fn post_images(&self, text: &StyledText, images: &[Vec<u8>]) -> Result<PostRef, PublishError> {
        let reused = self.has_session().await;
        let post = match self.publish_once(text, images).await {
            Err(PublishError::Auth { status, .. }) if reused => {
                // Cached session went stale; log in again once.
                warn!(status, "bluesky session rejected, re-authenticating");
                self.invalidate_session().await;
                self.publish_once(text, images).await?
            }
            other => other?,
        };
        info!(uri = %post.uri, images = images.len(), "published to bluesky");
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::build_styled_text;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> BlueskyClient {
        BlueskyClient::new(&BlueskyConfig {
            identifier: "me.bsky.social".into(),
            app_password: "app-pass".into(),
            service: server.uri(),
        })
    }

    async fn mount_session(server: &MockServer, expected: u64) {
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .and(body_partial_json(json!({"identifier": "me.bsky.social", "password": "app-pass"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessJwt": "jwt-1", "refreshJwt": "r", "handle": "me.bsky.social", "did": "did:plc:me"
            })))
            .expect(expected)
            .mount(server)
            .await;
    }

    #[test]
    fn facets_cover_tag_bytes() {
        let styled = build_styled_text("#cat cute");
        let facets = facets_for(&styled);
        assert_eq!(facets.len(), 1);
        assert_eq!(
            facets[0].index,
            ByteSlice {
                byte_start: 5,
                byte_end: 9
            }
        );
        let json = serde_json::to_value(&facets[0]).unwrap();
        assert_eq!(json["index"]["byteStart"], 5);
        assert_eq!(json["features"][0]["$type"], "app.bsky.richtext.facet#tag");
        assert_eq!(json["features"][0]["tag"], "cat");
    }

    #[test]
    fn sniff_known_signatures() {
        assert_eq!(sniff_image_mime(&[0x89, b'P', b'N', b'G', 0x0D]), "image/png");
        assert_eq!(sniff_image_mime(b"GIF89a"), "image/gif");
        assert_eq!(sniff_image_mime(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff_image_mime(&[0xFF, 0xD8, 0xFF]), "image/jpeg");
        assert_eq!(sniff_image_mime(&[]), "image/jpeg");
    }

    #[test]
    fn expired_token_is_auth_failure() {
        let err = xrpc_failure(
            CREATE_RECORD,
            400,
            r#"{"error":"ExpiredToken","message":"Token has expired"}"#.into(),
        );
        assert!(matches!(err, PublishError::Auth { status: 400, .. }));

        let err = xrpc_failure(CREATE_RECORD, 400, r#"{"error":"InvalidRequest"}"#.into());
        assert!(matches!(err, PublishError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn post_uploads_each_image_and_creates_record() {
        let server = MockServer::start().await;
        mount_session(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.uploadBlob"))
            .and(header("authorization", "Bearer jwt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "blob": {"$type": "blob", "ref": {"$link": "bafy"}, "mimeType": "image/jpeg", "size": 3}
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.createRecord"))
            .and(body_partial_json(json!({
                "repo": "did:plc:me",
                "collection": "app.bsky.feed.post",
                "record": {
                    "$type": "app.bsky.feed.post",
                    "text": "cute #cat",
                    "facets": [{"index": {"byteStart": 5, "byteEnd": 9}}],
                    "embed": {"$type": "app.bsky.embed.images"}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uri": "at://did:plc:me/app.bsky.feed.post/3k", "cid": "bafyrei"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let post = client
            .post_images(&build_styled_text("#cat cute"), &[vec![0xFF, 0xD8, 0xFF], vec![0xFF, 0xD8, 0xFF]])
            .await
            .unwrap();
        assert_eq!(post.uri, "at://did:plc:me/app.bsky.feed.post/3k");
    }

    #[tokio::test]
    async fn session_is_reused_across_posts() {
        let server = MockServer::start().await;
        mount_session(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.createRecord"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uri": "at://x", "cid": "c"})))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let text = build_styled_text("no images");
        client.post_images(&text, &[]).await.unwrap();
        client.post_images(&text, &[]).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_login_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "AuthenticationRequired", "message": "Invalid identifier or password"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.load_session().await.unwrap_err();
        assert!(matches!(err, PublishError::Login { status: 401, .. }));
    }

    #[tokio::test]
    async fn bad_credentials_log_in_only_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "AuthenticationRequired", "message": "Invalid identifier or password"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .post_images(&build_styled_text("hello"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Login { status: 401, .. }));
        let logins = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/xrpc/com.atproto.server.createSession")
            .count();
        assert_eq!(logins, 1);
    }

    #[tokio::test]
    async fn expired_session_logs_in_again_and_retries() {
        let server = MockServer::start().await;
        mount_session(&server, 2).await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.createRecord"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "ExpiredToken", "message": "Token has expired"
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.createRecord"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uri": "at://x/2", "cid": "c2"})))
            .with_priority(2)
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.load_session().await.unwrap();
        let post = client.post_images(&build_styled_text("again"), &[]).await.unwrap();
        assert_eq!(post.uri, "at://x/2");
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_network() {
        let client = BlueskyClient::new(&BlueskyConfig {
            identifier: String::new(),
            app_password: String::new(),
            service: "http://127.0.0.1:9".into(),
        });
        assert!(matches!(
            client.load_session().await,
            Err(PublishError::MissingCredentials)
        ));
    }
}
