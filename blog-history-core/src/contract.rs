//! # contract: seams between the pipeline and its collaborators
//!
//! - [`VersionControlSink`] receives staged writes and timestamped commits.
//! - [`ResponseCache`] sits in front of the content client and may answer a
//!   request without touching the network.
//!
//! Both traits are annotated for `mockall` so tests can script exact call
//! sequences. The mocks are exported behind the `test-export-mocks` feature.

use std::fmt;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::SinkError;
use crate::model::{PostType, Timestamp};

/// Destination of the replayed history.
///
/// Writing a path that was already staged replaces its staged content; a
/// commit captures everything staged since the previous commit.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait VersionControlSink: Send {
    /// Stage `content` at `path` (relative, `/`-separated).
    async fn write_file(&mut self, path: &str, content: &[u8]) -> Result<(), SinkError>;

    /// Record one commit using the given timestamps verbatim.
    async fn commit(
        &mut self,
        message: &str,
        author_time: Timestamp,
        commit_time: Timestamp,
    ) -> Result<(), SinkError>;
}

/// Logical identity of a remote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Sites,
    PostsPage {
        site_id: i64,
        post_type: PostType,
        page: u32,
    },
    Post {
        site_id: i64,
        post_id: i64,
    },
    Attachment {
        site_id: i64,
        attachment_id: i64,
    },
    PostHistory {
        site_id: i64,
        post_id: i64,
    },
}

// Rendered form doubles as a file stem for on-disk caches.
impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Sites => f.write_str("sites"),
            CacheKey::PostsPage {
                site_id,
                post_type,
                page,
            } => write!(f, "posts_{site_id}_{post_type}_{page}"),
            CacheKey::Post { site_id, post_id } => write!(f, "post_{site_id}_{post_id}"),
            CacheKey::Attachment {
                site_id,
                attachment_id,
            } => write!(f, "attachment_{site_id}_{attachment_id}"),
            CacheKey::PostHistory { site_id, post_id } => {
                write!(f, "post_history_{site_id}_{post_id}")
            }
        }
    }
}

/// Optional response cache in front of the content client.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ResponseCache: Send + Sync {
    /// Returns the stored body for `key`, if any.
    fn load(&self, key: &CacheKey) -> std::io::Result<Option<Vec<u8>>>;

    /// Stores a successful response body under `key`.
    fn store(&self, key: &CacheKey, body: &[u8]) -> std::io::Result<()>;
}
