//! Remote content client for the WordPress.com REST API.
//!
//! Every call goes through the same path: ask the [`ResponseCache`] for the
//! request's [`CacheKey`], otherwise wait on the [`Throttle`], issue one GET,
//! validate, and store the body. Calls are awaited one at a time.

use std::fmt;
use std::sync::Arc;

use async_stream::try_stream;
use futures::Stream;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::{DirCache, NoCache};
use crate::config::HistoryConfig;
use crate::contract::{CacheKey, ResponseCache};
use crate::error::ClientError;
use crate::model::{Attachment, Post, PostRevision, PostType, Site, Timestamp};
use crate::throttle::Throttle;

/// Number of posts requested per listing page.
pub const PAGE_SIZE: usize = 20;

const USER_AGENT: &str = concat!("blog-history/", env!("CARGO_PKG_VERSION"));

/// Bearer credential obtained from the platform's login flow.
#[derive(Clone)]
pub struct Session {
    access_token: String,
}

impl Session {
    pub fn new(access_token: impl Into<String>) -> Self {
        Session {
            access_token: access_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Attachment entry as listed inside a post's detail payload.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AttachmentRef {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "URL")]
    pub url: String,
}

#[derive(Deserialize)]
struct Envelope {
    code: u16,
    #[serde(default)]
    body: Value,
}

#[derive(Deserialize)]
struct SitesBody {
    sites: Vec<SiteWire>,
}

#[derive(Deserialize)]
struct SiteWire {
    #[serde(rename = "ID")]
    id: i64,
    #[serde(rename = "URL")]
    url: String,
}

#[derive(Deserialize)]
struct PostsPageBody {
    found: u64,
    posts: Vec<PostRef>,
}

#[derive(Deserialize)]
struct PostRef {
    #[serde(rename = "ID")]
    id: i64,
}

#[derive(Deserialize)]
struct PostWire {
    #[serde(rename = "ID")]
    id: i64,
    #[serde(rename = "type")]
    post_type: PostType,
    slug: String,
    title: String,
    content: String,
    date: String,
    #[serde(default)]
    revisions: Option<Vec<i64>>,
    #[serde(default)]
    attachments: Value,
}

#[derive(Deserialize)]
struct DiffsBody {
    #[serde(default)]
    revisions: Value,
}

#[derive(Deserialize)]
struct RevisionWire {
    id: i64,
    post_title: String,
    post_content: String,
    post_modified_gmt: String,
}

pub struct ContentClient {
    http: reqwest::Client,
    api_base: String,
    session: Option<Session>,
    throttle: Throttle,
    cache: Box<dyn ResponseCache>,
}

impl ContentClient {
    pub fn new(
        api_base: impl Into<String>,
        throttle: Throttle,
        cache: Box<dyn ResponseCache>,
    ) -> Result<Self, ClientError> {
        let api_base = api_base.into().trim_end_matches('/').to_owned();
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| ClientError::Transport {
                url: api_base.clone(),
                source,
            })?;
        Ok(ContentClient {
            http,
            api_base,
            session: None,
            throttle,
            cache,
        })
    }

    /// Builds a client with the throttle and cache described by `config`.
    pub fn from_config(config: &HistoryConfig) -> Result<Self, ClientError> {
        let cache: Box<dyn ResponseCache> = match &config.cache_dir {
            Some(dir) => Box::new(DirCache::open(dir)?),
            None => Box::new(NoCache),
        };
        Self::new(
            config.api_base.clone(),
            Throttle::new(config.request_interval()),
            cache,
        )
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Lists every site visible to the session.
    pub async fn list_sites(&self) -> Result<Vec<Site>, ClientError> {
        let url = format!(
            "{}/v1.2/me/sites?http_envelope=1&site_visibility=all&include_domain_only=true&site_activity=active",
            self.api_base
        );
        let body: SitesBody = self.fetch_envelope(CacheKey::Sites, &url).await?;
        let sites = body
            .sites
            .into_iter()
            .map(|s| Site::new(s.id, s.url))
            .collect::<Result<Vec<_>, _>>()?;
        info!(count = sites.len(), "Listed sites");
        Ok(sites)
    }

    /// Streams every post of one type on a site, each fully fetched.
    ///
    /// Pages are requested until the number of yielded posts reaches the
    /// server-reported total, or a page comes back short.
    pub fn list_posts<'a>(
        &'a self,
        site: &'a Arc<Site>,
        post_type: PostType,
    ) -> impl Stream<Item = Result<Post, ClientError>> + 'a {
        try_stream! {
            let mut page: u32 = 1;
            let mut yielded: u64 = 0;
            loop {
                let url = format!(
                    "{}/v1.1/sites/{}/posts?http_envelope=1&number={}&order=DESC&status=publish%2Cprivate&type={}&page={}",
                    self.api_base, site.id, PAGE_SIZE, post_type, page
                );
                let key = CacheKey::PostsPage { site_id: site.id, post_type, page };
                let body: PostsPageBody = self.fetch_envelope(key, &url).await?;
                let returned = body.posts.len();
                debug!(
                    site_id = site.id,
                    %post_type,
                    page,
                    returned,
                    found = body.found,
                    "Fetched posts page"
                );

                for post_ref in body.posts {
                    let post = self.get_post(site, post_ref.id).await?;
                    yielded += 1;
                    yield post;
                }

                if yielded >= body.found {
                    break;
                }
                if returned < PAGE_SIZE {
                    warn!(
                        site_id = site.id,
                        %post_type,
                        yielded,
                        found = body.found,
                        "Server returned a short page before reaching its reported total, stopping"
                    );
                    break;
                }
                page += 1;
            }
        }
    }

    /// Fetches one post in full, including all its attachment payloads.
    pub async fn get_post(&self, site: &Arc<Site>, post_id: i64) -> Result<Post, ClientError> {
        let url = format!(
            "{}/v1.1/sites/{}/posts/{}?http_envelope=1&context=edit&meta=autosave",
            self.api_base, site.id, post_id
        );
        let key = CacheKey::Post {
            site_id: site.id,
            post_id,
        };
        let wire: PostWire = self.fetch_envelope(key, &url).await?;
        let date = Timestamp::parse(&wire.date)
            .map_err(|e| ClientError::malformed(format!("{key} date {:?}", wire.date), e))?;

        let mut post = Post::new(
            Arc::clone(site),
            wire.post_type,
            wire.id,
            &wire.slug,
            wire.title,
            wire.content,
            date,
        );
        post.revision_ids = wire.revisions.unwrap_or_default();

        for entry in entries_in_order(&key, "attachments", wire.attachments)? {
            let attachment_ref: AttachmentRef = serde_json::from_value(entry)
                .map_err(|e| ClientError::malformed(format!("{key} attachment"), e))?;
            post.attachments
                .push(self.get_attachment(site, &attachment_ref).await?);
        }

        debug!(
            site_id = site.id,
            post_id = post.id,
            post_type = %post.post_type,
            revisions = post.revision_ids.len(),
            attachments = post.attachments.len(),
            "Fetched post"
        );
        Ok(post)
    }

    /// Downloads an attachment payload from its own URL.
    pub async fn get_attachment(
        &self,
        site: &Site,
        attachment: &AttachmentRef,
    ) -> Result<Attachment, ClientError> {
        url::Url::parse(&attachment.url).map_err(|source| ClientError::InvalidUrl {
            url: attachment.url.clone(),
            source,
        })?;
        let key = CacheKey::Attachment {
            site_id: site.id,
            attachment_id: attachment.id,
        };
        let data = self.fetch_bytes(key, &attachment.url).await?;
        debug!(
            site_id = site.id,
            attachment_id = attachment.id,
            bytes = data.len(),
            "Fetched attachment"
        );
        Attachment::new(attachment.id, attachment.url.clone(), data)
    }

    /// Returns every historical revision of `post` in server order.
    ///
    /// Posts without diff history yield a single revision mirroring their
    /// current state.
    pub async fn get_post_revisions(&self, post: &Post) -> Result<Vec<PostRevision>, ClientError> {
        if post.revision_ids.is_empty() {
            return Ok(vec![PostRevision::synthetic(post)]);
        }

        let url = format!(
            "{}/v1.2/sites/{}/post/{}/diffs?http_envelope=1",
            self.api_base, post.site.id, post.id
        );
        let key = CacheKey::PostHistory {
            site_id: post.site.id,
            post_id: post.id,
        };
        let body: DiffsBody = self.fetch_envelope(key, &url).await?;

        let mut revisions = Vec::new();
        for entry in entries_in_order(&key, "revisions", body.revisions)? {
            let wire: RevisionWire = serde_json::from_value(entry)
                .map_err(|e| ClientError::malformed(format!("{key} revision"), e))?;
            let modified_at = if is_zero_date(&wire.post_modified_gmt) {
                debug!(
                    post = %post.key(),
                    revision = wire.id,
                    "Zero modified time, using post date"
                );
                post.date
            } else {
                Timestamp::parse(&wire.post_modified_gmt).map_err(|e| {
                    ClientError::malformed(
                        format!(
                            "{key} revision {} modified time {:?}",
                            wire.id, wire.post_modified_gmt
                        ),
                        e,
                    )
                })?
            };
            revisions.push(PostRevision {
                post: post.key(),
                id: wire.id,
                title: wire.post_title,
                content: wire.post_content,
                modified_at,
            });
        }

        if revisions.is_empty() {
            warn!(post = %post.key(), "Diff history came back empty, using the current state");
            revisions.push(PostRevision::synthetic(post));
        }
        debug!(post = %post.key(), count = revisions.len(), "Fetched revisions");
        Ok(revisions)
    }

    async fn fetch_envelope<T: DeserializeOwned>(
        &self,
        key: CacheKey,
        url: &str,
    ) -> Result<T, ClientError> {
        if let Some(cached) = self.cache.load(&key)? {
            debug!(key = %key, "Cache hit");
            return open_envelope(&key, url, &cached);
        }
        let body = self.request(url).await?;
        let payload = open_envelope(&key, url, &body)?;
        self.cache.store(&key, &body)?;
        Ok(payload)
    }

    async fn fetch_bytes(&self, key: CacheKey, url: &str) -> Result<Vec<u8>, ClientError> {
        if let Some(cached) = self.cache.load(&key)? {
            debug!(key = %key, "Cache hit");
            return Ok(cached);
        }
        let body = self.request(url).await?;
        self.cache.store(&key, &body)?;
        Ok(body)
    }

    async fn request(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        self.throttle.wait().await;
        debug!(method = "GET", url, "Sending request");

        let mut request = self.http.get(url);
        if let Some(session) = &self.session {
            request = request.bearer_auth(session.access_token());
        }
        let response = request.send().await.map_err(|source| {
            error!(error = %source, url, "Request failed");
            ClientError::Transport {
                url: url.to_owned(),
                source,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), url, "Request returned an error status");
            return Err(ClientError::from_status(url, status.as_u16()));
        }
        let body = response
            .bytes()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.to_owned(),
                source,
            })?;
        Ok(body.to_vec())
    }
}

/// Unwraps an `http_envelope=1` response. Such responses are always HTTP 200,
/// the real status lives in `code`.
fn open_envelope<T: DeserializeOwned>(
    key: &CacheKey,
    url: &str,
    raw: &[u8],
) -> Result<T, ClientError> {
    let envelope: Envelope =
        serde_json::from_slice(raw).map_err(|e| ClientError::malformed(key.to_string(), e))?;
    if !(200..300).contains(&envelope.code) {
        error!(code = envelope.code, url, body = %envelope.body, "API envelope reported an error");
        return Err(ClientError::from_status(url, envelope.code));
    }
    serde_json::from_value(envelope.body).map_err(|e| ClientError::malformed(key.to_string(), e))
}

/// WordPress stores unset dates as `0000-00-00 00:00:00`.
fn is_zero_date(raw: &str) -> bool {
    raw.trim_start().starts_with("0000-00-00")
}

/// Values of a JSON object in document order. The API sends `[]` for empty maps.
fn entries_in_order(key: &CacheKey, field: &str, value: Value) -> Result<Vec<Value>, ClientError> {
    match value {
        Value::Object(map) => Ok(map.into_iter().map(|(_, v)| v).collect()),
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(ClientError::malformed(
            format!("{key} {field}"),
            format!("expected an object, got {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_code_is_authoritative() {
        let key = CacheKey::Sites;
        let raw = json!({"code": 403, "body": {"error": "unauthorized"}}).to_string();
        let res: Result<SitesBody, _> = open_envelope(&key, "u", raw.as_bytes());
        assert!(matches!(res, Err(ClientError::Auth { status: 403, .. })));

        let raw = json!({"code": 404, "body": {"error": "unknown_post"}}).to_string();
        let res: Result<SitesBody, _> = open_envelope(&key, "u", raw.as_bytes());
        assert!(matches!(res, Err(ClientError::NotFound { .. })));
    }

    #[test]
    fn missing_fields_fail_fast() {
        let key = CacheKey::Sites;
        let raw = json!({"code": 200, "body": {"sites": [{"ID": 1}]}}).to_string();
        let res: Result<SitesBody, _> = open_envelope(&key, "u", raw.as_bytes());
        assert!(matches!(res, Err(ClientError::Malformed { .. })));

        let res: Result<SitesBody, _> = open_envelope(&key, "u", b"<html>");
        assert!(matches!(res, Err(ClientError::Malformed { .. })));
    }

    #[test]
    fn object_entries_keep_document_order() {
        let key = CacheKey::Sites;
        let value: Value = serde_json::from_str(r#"{"9": 1, "2": 2, "5": 3}"#).unwrap();
        let entries = entries_in_order(&key, "revisions", value).unwrap();
        assert_eq!(entries, vec![json!(1), json!(2), json!(3)]);

        assert!(entries_in_order(&key, "revisions", json!([])).unwrap().is_empty());
        assert!(entries_in_order(&key, "revisions", Value::Null).unwrap().is_empty());
        assert!(entries_in_order(&key, "revisions", json!("nope")).is_err());
    }

    #[test]
    fn zero_dates_are_recognised() {
        assert!(is_zero_date("0000-00-00 00:00:00"));
        assert!(is_zero_date("0000-00-00T00:00:00Z"));
        assert!(!is_zero_date("2020-01-01 00:00:00"));
    }

    #[test]
    fn session_debug_hides_token() {
        let rendered = format!("{:?}", Session::new("secret-token"));
        assert!(!rendered.contains("secret-token"));
    }
}
