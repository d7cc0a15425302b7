//! Version-control sinks: the real git-backed one and an in-memory recorder.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::config::AuthorIdentity;
use crate::contract::VersionControlSink;
use crate::error::SinkError;
use crate::model::Timestamp;

pub const FALLBACK_AUTHOR_NAME: &str = "blog-history";
pub const FALLBACK_AUTHOR_EMAIL: &str = "blog-history@localhost";

/// Writes history into a fresh git repository by driving the `git` binary.
///
/// Content is staged straight into the object database and index; the work
/// tree is never populated.
#[derive(Debug)]
pub struct GitSink {
    root: PathBuf,
    identity: AuthorIdentity,
    commits: usize,
}

impl GitSink {
    /// Fails with [`SinkError::StoreAlreadyExists`] if anything is at `path`.
    pub fn ensure_vacant(path: &Path) -> Result<(), SinkError> {
        if path.exists() {
            error!(path = %path.display(), "Refusing to write into an existing store");
            return Err(SinkError::StoreAlreadyExists(path.to_path_buf()));
        }
        Ok(())
    }

    /// Creates a new repository at `path`, which must not exist yet.
    ///
    /// Commits are attributed to `identity`, or to [`FALLBACK_AUTHOR_NAME`]
    /// when none is given, so host git config is never consulted.
    pub fn init(
        path: impl AsRef<Path>,
        identity: Option<AuthorIdentity>,
    ) -> Result<Self, SinkError> {
        let root = path.as_ref().to_path_buf();
        Self::ensure_vacant(&root)?;
        std::fs::create_dir_all(&root)?;

        let output = Command::new("git")
            .arg("init")
            .arg("-q")
            .arg(&root)
            .stdin(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(git_failure("init", &output));
        }
        info!(path = %root.display(), "Initialised git repository");
        let identity = identity.unwrap_or_else(|| AuthorIdentity {
            name: FALLBACK_AUTHOR_NAME.to_owned(),
            email: FALLBACK_AUTHOR_EMAIL.to_owned(),
        });
        Ok(GitSink {
            root,
            identity,
            commits: 0,
        })
    }

    fn git(
        &self,
        args: &[&str],
        stdin: &[u8],
        env: &[(&str, String)],
    ) -> Result<String, SinkError> {
        let mut child = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(stdin)?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            let command = args.first().copied().unwrap_or_default();
            return Err(git_failure(command, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    fn commit_env(
        &self,
        author_time: Timestamp,
        commit_time: Timestamp,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("GIT_AUTHOR_DATE", git_date(author_time)),
            ("GIT_COMMITTER_DATE", git_date(commit_time)),
            ("GIT_AUTHOR_NAME", self.identity.name.clone()),
            ("GIT_AUTHOR_EMAIL", self.identity.email.clone()),
            ("GIT_COMMITTER_NAME", self.identity.name.clone()),
            ("GIT_COMMITTER_EMAIL", self.identity.email.clone()),
        ]
    }
}

#[async_trait]
impl VersionControlSink for GitSink {
    async fn write_file(&mut self, path: &str, content: &[u8]) -> Result<(), SinkError> {
        let blob = self.git(&["hash-object", "-w", "--stdin"], content, &[])?;
        let cacheinfo = format!("100644,{blob},{path}");
        self.git(&["update-index", "--add", "--cacheinfo", &cacheinfo], &[], &[])?;
        debug!(path, blob = %blob, bytes = content.len(), "Staged file");
        Ok(())
    }

    async fn commit(
        &mut self,
        message: &str,
        author_time: Timestamp,
        commit_time: Timestamp,
    ) -> Result<(), SinkError> {
        let env = self.commit_env(author_time, commit_time);
        self.git(
            &[
                "commit",
                "-q",
                "--allow-empty",
                "--no-verify",
                "--no-gpg-sign",
                "--cleanup=verbatim",
                "-F",
                "-",
            ],
            message.as_bytes(),
            &env,
        )?;
        self.commits += 1;
        debug!(commit = self.commits, %author_time, message = message.trim_end(), "Committed");
        Ok(())
    }
}

/// Git's internal date format; API times are UTC.
fn git_date(ts: Timestamp) -> String {
    format!("{} +0000", ts.unix_seconds())
}

fn git_failure(command: &str, output: &std::process::Output) -> SinkError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    error!(command, status = %output.status, stderr = %stderr, "git command failed");
    SinkError::Git {
        command: command.to_owned(),
        status: output.status.to_string(),
        stderr,
    }
}

/// Something a sink was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Write {
        path: String,
        content: Vec<u8>,
    },
    Commit {
        message: String,
        author_time: Timestamp,
        commit_time: Timestamp,
    },
}

/// Keeps every call in memory, and the resulting tree, for inspection.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Vec<SinkEvent>,
    tree: BTreeMap<String, Vec<u8>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    /// Latest content of every path written so far.
    pub fn tree(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.tree
    }

    pub fn commits(&self) -> impl Iterator<Item = (&str, Timestamp, Timestamp)> {
        self.events.iter().filter_map(|event| match event {
            SinkEvent::Commit {
                message,
                author_time,
                commit_time,
            } => Some((message.as_str(), *author_time, *commit_time)),
            SinkEvent::Write { .. } => None,
        })
    }

    pub fn writes(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.events.iter().filter_map(|event| match event {
            SinkEvent::Write { path, content } => Some((path.as_str(), content.as_slice())),
            SinkEvent::Commit { .. } => None,
        })
    }
}

#[async_trait]
impl VersionControlSink for RecordingSink {
    async fn write_file(&mut self, path: &str, content: &[u8]) -> Result<(), SinkError> {
        self.tree.insert(path.to_owned(), content.to_vec());
        self.events.push(SinkEvent::Write {
            path: path.to_owned(),
            content: content.to_vec(),
        });
        Ok(())
    }

    async fn commit(
        &mut self,
        message: &str,
        author_time: Timestamp,
        commit_time: Timestamp,
    ) -> Result<(), SinkError> {
        self.events.push(SinkEvent::Commit {
            message: message.to_owned(),
            author_time,
            commit_time,
        });
        Ok(())
    }
}
