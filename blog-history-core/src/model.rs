//! Entity model: sites, posts, attachments and revisions.
//!
//! Posts are owned by the table built while gathering; revisions point back at
//! their post through a [`PostKey`] instead of holding the post itself.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A UTC instant without a timezone suffix, e.g. `2019-04-01T10:22:03`.
///
/// Ordering is chronological and matches lexical order of the rendered string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Normalizes an API timestamp.
    ///
    /// Trailing `Z` and explicit offsets are folded into UTC; strings without a
    /// suffix are taken as UTC already.
    pub fn parse(raw: &str) -> Result<Self, chrono::ParseError> {
        let raw = raw.trim();
        if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Timestamp(with_offset.naive_utc()));
        }
        NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
            .map(Timestamp)
    }

    pub fn unix_seconds(&self) -> i64 {
        self.0.and_utc().timestamp()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub id: i64,
    pub url: String,
    host: String,
}

impl Site {
    pub fn new(id: i64, url: impl Into<String>) -> Result<Self, ClientError> {
        let url = url.into();
        let parsed = url::Url::parse(&url).map_err(|source| ClientError::InvalidUrl {
            url: url.clone(),
            source,
        })?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_owned(),
            (None, _) => {
                return Err(ClientError::malformed(
                    format!("site {id}"),
                    "url has no host",
                ))
            }
        };
        Ok(Site { id, url, host })
    }

    /// Network location of the site URL, port included when explicit.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Top-level directory of this site inside the store.
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.id, self.host)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Page,
    Post,
}

impl PostType {
    /// Traversal order used when gathering history.
    pub const ALL: [PostType; 2] = [PostType::Page, PostType::Post];

    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Page => "page",
            PostType::Post => "post",
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of a post across the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostKey {
    pub site_id: i64,
    pub post_id: i64,
}

impl fmt::Display for PostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.site_id, self.post_id)
    }
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub id: i64,
    pub url: String,
    pub data: Vec<u8>,
    path: String,
}

impl Attachment {
    pub fn new(id: i64, url: impl Into<String>, data: Vec<u8>) -> Result<Self, ClientError> {
        let url = url.into();
        let parsed = url::Url::parse(&url).map_err(|source| ClientError::InvalidUrl {
            url: url.clone(),
            source,
        })?;
        let path = parsed.path().to_owned();
        Ok(Attachment { id, url, data, path })
    }

    /// Path component of the attachment URL, still percent-encoded.
    pub fn url_path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct Post {
    pub site: Arc<Site>,
    pub post_type: PostType,
    pub id: i64,
    /// URL-decoded slug.
    pub slug: String,
    pub title: String,
    pub content: String,
    pub date: Timestamp,
    pub revision_ids: Vec<i64>,
    pub attachments: Vec<Attachment>,
}

impl Post {
    pub fn new(
        site: Arc<Site>,
        post_type: PostType,
        id: i64,
        raw_slug: &str,
        title: String,
        content: String,
        date: Timestamp,
    ) -> Self {
        let slug = String::from_utf8_lossy(&urlencoding::decode_binary(raw_slug.as_bytes()))
            .into_owned();
        Post {
            site,
            post_type,
            id,
            slug,
            title,
            content,
            date,
            revision_ids: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn key(&self) -> PostKey {
        PostKey {
            site_id: self.site.id,
            post_id: self.id,
        }
    }
}

// Posts compare by identity: content changes from revision to revision.
impl PartialEq for Post {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Post {}

impl Hash for Post {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// One historical snapshot of a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRevision {
    pub post: PostKey,
    pub id: i64,
    pub title: String,
    pub content: String,
    pub modified_at: Timestamp,
}

impl PostRevision {
    /// Stand-in revision for posts the platform kept no diff history for.
    pub fn synthetic(post: &Post) -> Self {
        PostRevision {
            post: post.key(),
            id: post.id,
            title: post.title.clone(),
            content: post.content.clone(),
            modified_at: post.date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Arc<Site> {
        Arc::new(Site::new(7, "https://example.com/blog").unwrap())
    }

    #[test]
    fn timestamps_drop_utc_suffixes() {
        for raw in [
            "2020-01-02T03:04:05Z",
            "2020-01-02T03:04:05+00:00",
            "2020-01-02T03:04:05",
            "2020-01-02 03:04:05",
        ] {
            assert_eq!(
                Timestamp::parse(raw).unwrap().to_string(),
                "2020-01-02T03:04:05",
                "input {raw}"
            );
        }
    }

    #[test]
    fn timestamps_fold_offsets_into_utc() {
        let ts = Timestamp::parse("2020-01-02T03:04:05+02:00").unwrap();
        assert_eq!(ts.to_string(), "2020-01-02T01:04:05");
        assert_eq!(ts.unix_seconds(), 1_577_927_045);
    }

    #[test]
    fn timestamps_reject_garbage() {
        assert!(Timestamp::parse("yesterday").is_err());
    }

    #[test]
    fn timestamp_order_matches_string_order() {
        let mut stamps: Vec<Timestamp> = [
            "2021-03-01T00:00:00",
            "2019-12-31T23:59:59",
            "2021-02-28T12:00:00",
        ]
        .iter()
        .map(|s| Timestamp::parse(s).unwrap())
        .collect();
        stamps.sort();
        let rendered: Vec<String> = stamps.iter().map(ToString::to_string).collect();
        let mut lexical = rendered.clone();
        lexical.sort();
        assert_eq!(rendered, lexical);
    }

    #[test]
    fn site_host_keeps_explicit_port() {
        assert_eq!(site().host(), "example.com");
        assert_eq!(site().dir_name(), "7_example.com");
        let local = Site::new(1, "http://127.0.0.1:8080/").unwrap();
        assert_eq!(local.host(), "127.0.0.1:8080");
    }

    #[test]
    fn site_rejects_unparseable_url() {
        assert!(matches!(
            Site::new(1, "not a url"),
            Err(ClientError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn slug_is_decoded_once() {
        let date = Timestamp::parse("2020-01-01T00:00:00").unwrap();
        let post = Post::new(
            site(),
            PostType::Post,
            99,
            "hello%2520world%20x",
            "t".into(),
            "c".into(),
            date,
        );
        assert_eq!(post.slug, "hello%20world x");
    }

    #[test]
    fn posts_compare_by_key_not_content() {
        let date = Timestamp::parse("2020-01-01T00:00:00").unwrap();
        let a = Post::new(site(), PostType::Post, 1, "a", "one".into(), "x".into(), date);
        let mut b = a.clone();
        b.content = "changed".into();
        assert_eq!(a, b);
        let c = Post::new(site(), PostType::Post, 2, "a", "one".into(), "x".into(), date);
        assert_ne!(a, c);
    }

    #[test]
    fn synthetic_revision_mirrors_post() {
        let date = Timestamp::parse("2020-05-05T05:05:05Z").unwrap();
        let post = Post::new(
            site(),
            PostType::Page,
            3,
            "about",
            "About".into(),
            "<p>hi</p>".into(),
            date,
        );
        let rev = PostRevision::synthetic(&post);
        assert_eq!(rev.post, post.key());
        assert_eq!(rev.id, 3);
        assert_eq!(rev.title, "About");
        assert_eq!(rev.content, "<p>hi</p>");
        assert_eq!(rev.modified_at, date);
    }

    #[test]
    fn attachment_path_stays_encoded() {
        let a = Attachment::new(
            5,
            "https://files.example.com/2020/01/my%20pic.png?w=10",
            vec![1],
        )
        .unwrap();
        assert_eq!(a.url_path(), "/2020/01/my%20pic.png");
    }
}
