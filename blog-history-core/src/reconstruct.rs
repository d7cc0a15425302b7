//! History reconstruction: gather every revision, order them, replay.
//!
//! Gathering talks to the network only. Planning is pure and turns the
//! gathered history into an ordered list of [`ReplayStep`]s. Execution feeds
//! those steps to a [`VersionControlSink`] one by one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::TryStreamExt;
use tracing::{debug, info, warn};

use crate::client::ContentClient;
use crate::config::HistoryConfig;
use crate::contract::VersionControlSink;
use crate::error::{ClientError, HistoryError, SinkError};
use crate::model::{Attachment, Post, PostKey, PostRevision, PostType, Site, Timestamp};
use crate::sink::GitSink;

/// Every post and revision of a run, held until replay.
#[derive(Debug, Default)]
pub struct GatheredHistory {
    sites: usize,
    posts: HashMap<PostKey, Post>,
    revisions: Vec<PostRevision>,
}

impl GatheredHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a post and its revisions, in traversal order.
    ///
    /// Returns `false` and ignores the call if the post is already known.
    pub fn insert(&mut self, post: Post, revisions: Vec<PostRevision>) -> bool {
        let key = post.key();
        if self.posts.contains_key(&key) {
            return false;
        }
        self.revisions.extend(revisions);
        self.posts.insert(key, post);
        true
    }

    pub fn contains(&self, key: &PostKey) -> bool {
        self.posts.contains_key(key)
    }

    pub fn post(&self, key: &PostKey) -> Option<&Post> {
        self.posts.get(key)
    }

    pub fn revisions(&self) -> &[PostRevision] {
        &self.revisions
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    pub fn site_count(&self) -> usize {
        self.sites
    }
}

/// Walks sites, then pages and posts, then each post's revisions.
pub async fn gather(client: &ContentClient) -> Result<GatheredHistory, ClientError> {
    let mut history = GatheredHistory::new();

    for site in client.list_sites().await? {
        let site = Arc::new(site);
        history.sites += 1;
        info!(site_id = site.id, url = %site.url, "Gathering site");

        for post_type in PostType::ALL {
            let posts = client.list_posts(&site, post_type);
            futures::pin_mut!(posts);
            while let Some(post) = posts.try_next().await? {
                if history.contains(&post.key()) {
                    warn!(post = %post.key(), "Post listed twice, keeping the first copy");
                    continue;
                }
                let revisions = client.get_post_revisions(&post).await?;
                debug!(post = %post.key(), revisions = revisions.len(), "Gathered post");
                history.insert(post, revisions);
            }
        }
    }

    info!(
        sites = history.site_count(),
        posts = history.post_count(),
        revisions = history.revisions().len(),
        "Gathered history"
    );
    Ok(history)
}

/// Where a post's content lives in the store.
pub fn content_path(post: &Post) -> String {
    format!(
        "{}/{}/{}_{}.html",
        post.site.dir_name(),
        post.post_type,
        post.id,
        post.slug
    )
}

/// Where an attachment lives in the store. The URL path keeps its leading `/`.
pub fn attachment_path(site: &Site, attachment: &Attachment) -> String {
    format!("{}/files{}", site.dir_name(), attachment.url_path())
}

pub fn commit_message(post: &Post, revision: &PostRevision) -> String {
    format!("{}: {}\n", post.id, revision.title)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite<'a> {
    pub path: String,
    pub content: &'a [u8],
}

/// Writes followed by one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayStep<'a> {
    pub post: PostKey,
    pub revision_id: i64,
    pub writes: Vec<FileWrite<'a>>,
    pub message: String,
    pub timestamp: Timestamp,
}

/// Orders every revision by modification time and derives its writes.
///
/// The sort is stable: equal timestamps keep traversal order. A post's
/// attachments ride along with its earliest revision only.
pub fn plan(history: &GatheredHistory) -> Result<Vec<ReplayStep<'_>>, HistoryError> {
    let mut ordered: Vec<&PostRevision> = history.revisions.iter().collect();
    ordered.sort_by_key(|revision| revision.modified_at);

    let mut seen: HashSet<PostKey> = HashSet::new();
    let mut steps = Vec::with_capacity(ordered.len());

    for revision in ordered {
        let post = history
            .post(&revision.post)
            .ok_or(HistoryError::UnknownPost(revision.post))?;

        let mut writes = vec![FileWrite {
            path: content_path(post),
            content: revision.content.as_bytes(),
        }];
        if seen.insert(post.key()) {
            writes.extend(post.attachments.iter().map(|attachment| FileWrite {
                path: attachment_path(&post.site, attachment),
                content: attachment.data.as_slice(),
            }));
        }

        steps.push(ReplayStep {
            post: post.key(),
            revision_id: revision.id,
            writes,
            message: commit_message(post, revision),
            timestamp: revision.modified_at,
        });
    }
    Ok(steps)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub commits: usize,
    pub writes: usize,
}

/// Replays the planned steps into `sink`, stopping at the first failure.
pub async fn execute<S>(steps: &[ReplayStep<'_>], sink: &mut S) -> Result<ReplayStats, SinkError>
where
    S: VersionControlSink + ?Sized,
{
    let mut stats = ReplayStats::default();
    for (index, step) in steps.iter().enumerate() {
        for write in &step.writes {
            sink.write_file(&write.path, write.content).await?;
            stats.writes += 1;
        }
        sink.commit(&step.message, step.timestamp, step.timestamp).await?;
        stats.commits += 1;

        if (index + 1) % 100 == 0 {
            info!(done = index + 1, total = steps.len(), "Replay progress");
        }
    }
    Ok(stats)
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryReport {
    pub sites: usize,
    pub posts: usize,
    pub revisions: usize,
    pub commits: usize,
    pub attachment_writes: usize,
}

/// Gathers the full history through `client` and replays it into `sink`.
pub async fn synchronise<S>(
    client: &ContentClient,
    sink: &mut S,
) -> Result<HistoryReport, HistoryError>
where
    S: VersionControlSink + ?Sized,
{
    let history = gather(client).await?;
    let steps = plan(&history)?;
    info!(commits = steps.len(), "Replaying history");
    let stats = execute(&steps, sink).await?;

    let report = HistoryReport {
        sites: history.site_count(),
        posts: history.post_count(),
        revisions: history.revisions().len(),
        commits: stats.commits,
        attachment_writes: stats.writes - stats.commits,
    };
    info!(?report, "Replay complete");
    Ok(report)
}

/// Creates the git store described by `config` and replays history into it.
///
/// The store is checked before any request is made.
pub async fn export_to_git(
    config: &HistoryConfig,
    client: &ContentClient,
) -> Result<HistoryReport, HistoryError> {
    let mut sink = GitSink::init(&config.repo_dir, config.author.clone())?;
    synchronise(client, &mut sink).await
}
