//! Error taxonomy for the history pipeline.
//!
//! Every error is fatal to a run: nothing here is retried or recovered locally.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::PostKey;

/// Failures raised while talking to the remote content API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Credentials were rejected, or the session is not authenticated.
    #[error("authentication rejected by {url} (status {status})")]
    Auth { url: String, status: u16 },

    /// A post or attachment disappeared between listing and detail fetch.
    #[error("resource not found: {url}")]
    NotFound { url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    /// The payload did not have the shape we rely on.
    #[error("malformed payload for {what}: {message}")]
    Malformed { what: String, message: String },

    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("response cache failure: {0}")]
    Cache(#[from] std::io::Error),
}

impl ClientError {
    pub(crate) fn malformed(what: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ClientError::Malformed {
            what: what.into(),
            message: message.to_string(),
        }
    }

    /// Maps a non-success status (HTTP or envelope `code`) onto the taxonomy.
    pub(crate) fn from_status(url: &str, status: u16) -> Self {
        match status {
            401 | 403 => ClientError::Auth {
                url: url.to_owned(),
                status,
            },
            404 => ClientError::NotFound {
                url: url.to_owned(),
            },
            _ => ClientError::HttpStatus {
                url: url.to_owned(),
                status,
            },
        }
    }
}

/// Failures raised by a version-control sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("store already exists at {0}")]
    StoreAlreadyExists(PathBuf),

    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("`git {command}` exited with {status}: {stderr}")]
    Git {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Top-level error of a history run.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("revision refers to unknown post {0}")]
    UnknownPost(PostKey),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_onto_the_taxonomy() {
        assert!(matches!(
            ClientError::from_status("u", 401),
            ClientError::Auth { status: 401, .. }
        ));
        assert!(matches!(
            ClientError::from_status("u", 403),
            ClientError::Auth { status: 403, .. }
        ));
        assert!(matches!(
            ClientError::from_status("u", 404),
            ClientError::NotFound { .. }
        ));
        assert!(matches!(
            ClientError::from_status("u", 502),
            ClientError::HttpStatus { status: 502, .. }
        ));
    }
}
